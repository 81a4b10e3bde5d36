//! Risk model and account constraints: every account field is required,
//! matching `RuntimeConfig`'s fail-loud `__post_init__` validation — a
//! Play missing `starting_equity_usdt` or carrying a non-positive
//! `max_leverage` fails compilation rather than falling back to a default.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopLoss {
    Percent { value: f64 },
    AtrMultiple { value: f64 },
    Fixed { value: f64 },
}

impl StopLoss {
    /// `None` only for `AtrMultiple` when no ATR value is available yet
    /// (warmup not complete) — every other variant always resolves.
    pub fn level(&self, entry_price: f64, is_long: bool, atr: Option<f64>) -> Option<f64> {
        match self {
            StopLoss::Percent { value } => Some(if is_long {
                entry_price * (1.0 - value / 100.0)
            } else {
                entry_price * (1.0 + value / 100.0)
            }),
            StopLoss::AtrMultiple { value } => {
                atr.map(|a| if is_long { entry_price - value * a } else { entry_price + value * a })
            }
            StopLoss::Fixed { value } => Some(*value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TakeProfit {
    RrRatio { value: f64 },
    Percent { value: f64 },
    Fixed { value: f64 },
}

impl TakeProfit {
    pub fn level(&self, entry_price: f64, is_long: bool, stop_level: f64) -> f64 {
        match self {
            TakeProfit::RrRatio { value } => {
                let risk = (entry_price - stop_level).abs();
                if is_long { entry_price + risk * value } else { entry_price - risk * value }
            }
            TakeProfit::Percent { value } => {
                if is_long { entry_price * (1.0 + value / 100.0) } else { entry_price * (1.0 - value / 100.0) }
            }
            TakeProfit::Fixed { value } => *value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Sizing {
    PercentEquity { value: f64 },
    FixedNotional { value: f64 },
    RiskBased { value: f64 },
}

impl Sizing {
    /// Order notional in quote currency, before account-limit clamping.
    pub fn notional(&self, equity: f64, entry_price: f64, stop_level: f64) -> f64 {
        match self {
            Sizing::PercentEquity { value } => equity * value / 100.0,
            Sizing::FixedNotional { value } => *value,
            Sizing::RiskBased { value } => {
                let risk_amount = equity * value / 100.0;
                let stop_distance_pct = ((entry_price - stop_level).abs() / entry_price).max(f64::EPSILON);
                risk_amount / stop_distance_pct
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskModel {
    pub stop_loss: StopLoss,
    pub take_profit: TakeProfit,
    pub sizing: Sizing,
    #[serde(default = "default_max_positions")]
    pub max_positions_per_symbol: u32,
    #[serde(default)]
    pub allow_flip: bool,
    #[serde(default)]
    pub allow_scale_in: bool,
    #[serde(default)]
    pub allow_scale_out: bool,
}

fn default_max_positions() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeModel {
    pub taker: f64,
    pub maker: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    Isolated,
    Cross,
}

/// Account constraints. No field here carries a silent default — a Play
/// artefact that omits one fails deserialization, and `validate` rejects
/// the non-positive values that deserialization alone cannot catch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub starting_equity_usdt: f64,
    pub max_leverage: f64,
    pub margin_mode: MarginMode,
    pub min_trade_notional_usdt: f64,
    pub max_notional_usdt: Option<f64>,
    pub max_margin_usdt: Option<f64>,
    pub fee_model: FeeModel,
    pub slippage_bps: Option<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum AccountValidationError {
    #[error("starting_equity_usdt must be > 0, got {0}")]
    NonPositiveEquity(f64),
    #[error("max_leverage must be > 0, got {0}")]
    NonPositiveLeverage(f64),
    #[error("min_trade_notional_usdt must be > 0, got {0}")]
    NonPositiveMinNotional(f64),
    #[error("fee_model.taker/maker must be >= 0, got taker={taker} maker={maker}")]
    NegativeFee { taker: f64, maker: f64 },
}

impl Account {
    pub fn validate(&self) -> Result<(), AccountValidationError> {
        if self.starting_equity_usdt <= 0.0 {
            return Err(AccountValidationError::NonPositiveEquity(self.starting_equity_usdt));
        }
        if self.max_leverage <= 0.0 {
            return Err(AccountValidationError::NonPositiveLeverage(self.max_leverage));
        }
        if self.min_trade_notional_usdt <= 0.0 {
            return Err(AccountValidationError::NonPositiveMinNotional(self.min_trade_notional_usdt));
        }
        if self.fee_model.taker < 0.0 || self.fee_model.maker < 0.0 {
            return Err(AccountValidationError::NegativeFee {
                taker: self.fee_model.taker,
                maker: self.fee_model.maker,
            });
        }
        Ok(())
    }

    /// Clamps a raw notional to the account's leverage/notional/margin caps,
    /// then to `min_trade_notional_usdt` — returns `None` if the floor
    /// exceeds every ceiling (no trade is possible at this equity).
    pub fn clamp_notional(&self, raw_notional: f64, equity: f64) -> Option<f64> {
        let mut capped = raw_notional.min(equity * self.max_leverage);
        if let Some(max_notional) = self.max_notional_usdt {
            capped = capped.min(max_notional);
        }
        if let Some(max_margin) = self.max_margin_usdt {
            capped = capped.min(max_margin * self.max_leverage);
        }
        if capped < self.min_trade_notional_usdt {
            return None;
        }
        Some(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_loss_percent_long_and_short() {
        let sl = StopLoss::Percent { value: 5.0 };
        assert_eq!(sl.level(100.0, true, None), Some(95.0));
        assert_eq!(sl.level(100.0, false, None), Some(105.0));
    }

    #[test]
    fn take_profit_rr_ratio_matches_worked_example() {
        // Entry at P=100, SL percent=5 (long), TP rr_ratio=2 -> SL=95, TP=110.
        let sl = StopLoss::Percent { value: 5.0 }.level(100.0, true, None).unwrap();
        let tp = TakeProfit::RrRatio { value: 2.0 }.level(100.0, true, sl);
        assert_eq!(sl, 95.0);
        assert_eq!(tp, 110.0);
    }

    #[test]
    fn account_rejects_non_positive_equity() {
        let acct = Account {
            starting_equity_usdt: 0.0,
            max_leverage: 5.0,
            margin_mode: MarginMode::Isolated,
            min_trade_notional_usdt: 10.0,
            max_notional_usdt: None,
            max_margin_usdt: None,
            fee_model: FeeModel { taker: 0.0006, maker: 0.0002 },
            slippage_bps: None,
        };
        assert_eq!(acct.validate(), Err(AccountValidationError::NonPositiveEquity(0.0)));
    }

    #[test]
    fn clamp_notional_respects_min_floor() {
        let acct = Account {
            starting_equity_usdt: 1000.0,
            max_leverage: 3.0,
            margin_mode: MarginMode::Isolated,
            min_trade_notional_usdt: 50.0,
            max_notional_usdt: Some(1500.0),
            max_margin_usdt: None,
            fee_model: FeeModel { taker: 0.0006, maker: 0.0002 },
            slippage_bps: None,
        };
        assert_eq!(acct.clamp_notional(2000.0, 1000.0), Some(1500.0));
        assert_eq!(acct.clamp_notional(10.0, 1000.0), None);
    }
}
