//! Order intent and the exec-adapter-facing position/account shapes
//! (spec.md §3 "Order intent", §6 "Exec adapter").

use serde::{Deserialize, Serialize};

use crate::domain::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Long,
    Short,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Long => OrderSide::Short,
            OrderSide::Short => OrderSide::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
    StopMarket,
    StopLimit,
}

/// `{symbol, side, kind, qty, price?, trigger_price?, reduce_only?, tp?,
/// sl?, client_id?}` exactly as spec.md §3 defines it. Immutable once
/// built; the Play Engine constructs one per entry/exit decision and
/// hands it to the exec adapter verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub qty: f64,
    pub price: Option<f64>,
    pub trigger_price: Option<f64>,
    pub reduce_only: bool,
    pub tp: Option<f64>,
    pub sl: Option<f64>,
    pub client_id: Option<String>,
}

impl OrderIntent {
    pub fn market_entry(symbol: impl Into<String>, side: OrderSide, qty: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            kind: OrderKind::Market,
            qty,
            price: None,
            trigger_price: None,
            reduce_only: false,
            tp: None,
            sl: None,
            client_id: None,
        }
    }

    pub fn reduce_only_exit(symbol: impl Into<String>, side: OrderSide, qty: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            kind: OrderKind::Market,
            qty,
            price: None,
            trigger_price: None,
            reduce_only: true,
            tp: None,
            sl: None,
            client_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<OrderId>,
    pub error: Option<String>,
}

impl OrderResult {
    pub fn ok(order_id: OrderId) -> Self {
        Self { success: true, order_id: Some(order_id), error: None }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self { success: false, order_id: None, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl From<OrderSide> for PositionSide {
    fn from(side: OrderSide) -> Self {
        match side {
            OrderSide::Long => PositionSide::Long,
            OrderSide::Short => PositionSide::Short,
        }
    }
}

/// An open position as exposed by the exec adapter (spec.md §6). Distinct
/// from `play::risk`'s sizing/stop types, which compute the *intent* this
/// position resulted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub qty: f64,
    pub avg_entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl Position {
    pub fn unrealized_pnl(&self, mark_price: f64) -> f64 {
        match self.side {
            PositionSide::Long => (mark_price - self.avg_entry_price) * self.qty,
            PositionSide::Short => (self.avg_entry_price - mark_price) * self.qty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub equity: f64,
    pub available: f64,
    pub unrealized_pnl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_position_pnl_is_positive_on_price_rise() {
        let pos = Position {
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            qty: 1.0,
            avg_entry_price: 100.0,
            stop_loss: None,
            take_profit: None,
        };
        assert_eq!(pos.unrealized_pnl(110.0), 10.0);
    }

    #[test]
    fn short_position_pnl_is_positive_on_price_fall() {
        let pos = Position {
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Short,
            qty: 2.0,
            avg_entry_price: 100.0,
            stop_loss: None,
            take_profit: None,
        };
        assert_eq!(pos.unrealized_pnl(95.0), 10.0);
    }
}
