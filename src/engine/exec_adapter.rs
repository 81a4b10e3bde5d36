//! Exec Adapter interface (spec.md §6): the boundary that keeps the Play
//! Engine ignorant of whether orders go to a simulator or an exchange.
//! `SimAdapter` is the backtest-mode implementation; a live adapter (REST/WS
//! client) is an out-of-scope collaborator that implements the same trait.

use std::collections::HashMap;

use crate::domain::IdGen;
use crate::play::{Account, FeeModel};

use super::order_intent::{AccountState, OrderIntent, OrderResult, Position};

/// Four methods, exactly as spec.md §6 lists them. Simulator and exchange
/// implementations are interchangeable; the Play Engine only ever calls
/// through this trait.
pub trait ExecAdapter {
    fn submit(&mut self, intent: &OrderIntent) -> OrderResult;
    fn current_position(&self, symbol: &str) -> Option<Position>;
    fn account_state(&self) -> AccountState;
    fn cancel(&mut self, order_id: crate::domain::OrderId) -> bool;
}

/// A frictionless, mark-price-fill simulator for backtesting. Fills every
/// order intent immediately at the mark price supplied to
/// `mark_price`/`process_bar`, charging the account's configured taker
/// fee. No partial fills, no order book — the engine's own risk checks
/// and the `RiskModel` are what a real exchange would reject on, not this
/// adapter.
pub struct SimAdapter {
    equity: f64,
    fee_model: FeeModel,
    positions: HashMap<String, Position>,
    id_gen: IdGen,
    mark_prices: HashMap<String, f64>,
}

impl SimAdapter {
    pub fn new(account: &Account) -> Self {
        Self {
            equity: account.starting_equity_usdt,
            fee_model: account.fee_model,
            positions: HashMap::new(),
            id_gen: IdGen::default(),
            mark_prices: HashMap::new(),
        }
    }

    /// The Play Engine calls this once per symbol per bar before
    /// evaluating exits/entries, so fills use the current bar's mark
    /// price rather than a stale one.
    pub fn set_mark_price(&mut self, symbol: &str, price: f64) {
        self.mark_prices.insert(symbol.to_string(), price);
    }

    pub fn equity(&self) -> f64 {
        let unrealized: f64 = self
            .positions
            .values()
            .filter_map(|p| self.mark_prices.get(&p.symbol).map(|&mp| p.unrealized_pnl(mp)))
            .sum();
        self.equity + unrealized
    }

    fn fill_and_open(&mut self, intent: &OrderIntent, price: f64) {
        let notional = intent.qty * price;
        let fee = notional * self.fee_model.taker;
        self.equity -= fee;
        self.positions.insert(
            intent.symbol.clone(),
            Position {
                symbol: intent.symbol.clone(),
                side: intent.side.into(),
                qty: intent.qty,
                avg_entry_price: price,
                stop_loss: intent.sl,
                take_profit: intent.tp,
            },
        );
    }

    fn fill_and_close(&mut self, symbol: &str, price: f64) {
        if let Some(pos) = self.positions.remove(symbol) {
            let pnl = pos.unrealized_pnl(price);
            let fee = pos.qty * price * self.fee_model.taker;
            self.equity += pnl - fee;
        }
    }
}

impl ExecAdapter for SimAdapter {
    fn submit(&mut self, intent: &OrderIntent) -> OrderResult {
        let Some(&price) = self.mark_prices.get(&intent.symbol) else {
            return OrderResult::rejected(format!("no mark price set for {}", intent.symbol));
        };
        if intent.qty <= 0.0 {
            return OrderResult::rejected("order qty must be positive");
        }

        if intent.reduce_only {
            if self.positions.contains_key(&intent.symbol) {
                self.fill_and_close(&intent.symbol, price);
            } else {
                return OrderResult::rejected(format!("no open position in {} to reduce", intent.symbol));
            }
        } else {
            if let Some(existing) = self.positions.get(&intent.symbol) {
                if existing.side == intent.side.into() {
                    return OrderResult::rejected("scale-in not supported by SimAdapter");
                }
                self.fill_and_close(&intent.symbol, price);
            }
            self.fill_and_open(intent, price);
        }

        OrderResult::ok(self.id_gen.next_order_id())
    }

    fn current_position(&self, symbol: &str) -> Option<Position> {
        self.positions.get(symbol).cloned()
    }

    fn account_state(&self) -> AccountState {
        let equity = self.equity();
        let unrealized = equity - self.equity;
        AccountState { equity, available: self.equity, unrealized_pnl: unrealized }
    }

    fn cancel(&mut self, _order_id: crate::domain::OrderId) -> bool {
        // SimAdapter fills synchronously inside submit(); there is never a
        // resting order to cancel.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::order_intent::OrderSide;
    use crate::play::{Account, MarginMode};

    fn account() -> Account {
        Account {
            starting_equity_usdt: 10_000.0,
            max_leverage: 5.0,
            margin_mode: MarginMode::Isolated,
            min_trade_notional_usdt: 10.0,
            max_notional_usdt: None,
            max_margin_usdt: None,
            fee_model: FeeModel { taker: 0.001, maker: 0.0 },
            slippage_bps: None,
        }
    }

    #[test]
    fn submit_without_mark_price_is_rejected() {
        let mut adapter = SimAdapter::new(&account());
        let intent = OrderIntent::market_entry("BTCUSDT", OrderSide::Long, 1.0);
        let result = adapter.submit(&intent);
        assert!(!result.success);
    }

    #[test]
    fn entry_then_reduce_only_exit_realizes_pnl() {
        let mut adapter = SimAdapter::new(&account());
        adapter.set_mark_price("BTCUSDT", 100.0);
        let entry = OrderIntent::market_entry("BTCUSDT", OrderSide::Long, 1.0);
        assert!(adapter.submit(&entry).success);
        assert!(adapter.current_position("BTCUSDT").is_some());

        adapter.set_mark_price("BTCUSDT", 110.0);
        let exit = OrderIntent::reduce_only_exit("BTCUSDT", OrderSide::Short, 1.0);
        assert!(adapter.submit(&exit).success);
        assert!(adapter.current_position("BTCUSDT").is_none());
        // 10 pnl - entry fee (0.1) - exit fee (0.11) = 9.79
        assert!((adapter.account_state().equity - 10_009.79).abs() < 1e-9);
    }

    #[test]
    fn reduce_only_without_position_is_rejected() {
        let mut adapter = SimAdapter::new(&account());
        adapter.set_mark_price("BTCUSDT", 100.0);
        let exit = OrderIntent::reduce_only_exit("BTCUSDT", OrderSide::Long, 1.0);
        assert!(!adapter.submit(&exit).success);
    }
}
