//! Incremental Indicator Registry (C2): a closed, tagged-sum set of ~40
//! technical indicators, uniform under one `Incremental` trait, built by a
//! factory that maps `(indicator_type, params) -> concrete`.
//!
//! Every indicator's incremental output must equal its batch (vectorised)
//! computation to within `1e-6` absolute tolerance after warmup — the
//! parity contract in spec.md §4.2, exercised by the `#[cfg(test)]` module
//! in each category file plus the property tests in `tests/`.

pub mod adaptive;
pub mod buffer_based;
pub mod core;
pub mod ema_composable;
pub mod factory;
pub mod lookback;
pub mod stateful;
pub mod trivial;
pub mod util;
pub mod volume;

use crate::domain::Bar;

pub use factory::{build_indicator, FactoryError, IndicatorParams};

/// A single closed bar's OHLCV fields, decoupled from `domain::Bar` so
/// indicators can be unit-tested without constructing full bars.
#[derive(Debug, Clone, Copy)]
pub struct Ohlcv {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl From<&Bar> for Ohlcv {
    fn from(bar: &Bar) -> Self {
        Self {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

impl From<Bar> for Ohlcv {
    fn from(bar: Bar) -> Self {
        Self::from(&bar)
    }
}

/// Uniform contract every incremental indicator satisfies. `update` must
/// only ever look at the bar passed to it and state from earlier calls —
/// no look-ahead is representable through this interface.
pub trait Incremental {
    fn update(&mut self, bar: Ohlcv);
    fn reset(&mut self);
    /// Primary output; `None` until warmup completes.
    fn value(&self) -> Option<f64>;
    fn is_ready(&self) -> bool;
    /// Named secondary output for multi-output indicators (e.g. `"signal"`,
    /// `"upper"`, `"%b"`). `None` for single-output indicators or unknown names.
    fn secondary(&self, _name: &str) -> Option<f64> {
        None
    }
}

/// Closed tagged sum over every concrete indicator. Modelling the family
/// this way (rather than `Box<dyn Incremental>`) keeps the per-bar update
/// loop free of vtable dispatch and lets the factory return a value type.
pub enum Ind {
    Ema(core::Ema),
    Sma(core::Sma),
    Rsi(core::Rsi),
    Atr(core::Atr),
    Macd(core::Macd),
    BBands(core::BBands),
    WilliamsR(core::WilliamsR),
    Cci(core::Cci),
    Stochastic(core::Stochastic),
    StochRsi(core::StochRsi),
    Adx(core::Adx),
    SuperTrend(core::SuperTrend),
    Ohlc4(trivial::Ohlc4),
    Midprice(trivial::Midprice),
    Roc(trivial::Roc),
    Mom(trivial::Mom),
    Obv(trivial::Obv),
    Natr(trivial::Natr),
    Dema(ema_composable::Dema),
    Tema(ema_composable::Tema),
    Ppo(ema_composable::Ppo),
    Trix(ema_composable::Trix),
    Tsi(ema_composable::Tsi),
    Wma(buffer_based::Wma),
    Trima(buffer_based::Trima),
    LinReg(buffer_based::LinReg),
    Cmf(buffer_based::Cmf),
    Cmo(buffer_based::Cmo),
    Mfi(buffer_based::Mfi),
    Aroon(lookback::Aroon),
    Donchian(lookback::Donchian),
    Kc(lookback::Kc),
    Dm(lookback::Dm),
    Vortex(lookback::Vortex),
    Kama(adaptive::Kama),
    Alma(adaptive::Alma),
    Zlma(adaptive::Zlma),
    Uo(adaptive::Uo),
    Psar(stateful::Psar),
    Squeeze(stateful::Squeeze),
    Fisher(stateful::Fisher),
    Kvo(volume::Kvo),
    Vwap(volume::Vwap),
    AnchoredVwap(volume::AnchoredVwap),
}

macro_rules! dispatch {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            Ind::Ema(i) => i.$method($($arg),*),
            Ind::Sma(i) => i.$method($($arg),*),
            Ind::Rsi(i) => i.$method($($arg),*),
            Ind::Atr(i) => i.$method($($arg),*),
            Ind::Macd(i) => i.$method($($arg),*),
            Ind::BBands(i) => i.$method($($arg),*),
            Ind::WilliamsR(i) => i.$method($($arg),*),
            Ind::Cci(i) => i.$method($($arg),*),
            Ind::Stochastic(i) => i.$method($($arg),*),
            Ind::StochRsi(i) => i.$method($($arg),*),
            Ind::Adx(i) => i.$method($($arg),*),
            Ind::SuperTrend(i) => i.$method($($arg),*),
            Ind::Ohlc4(i) => i.$method($($arg),*),
            Ind::Midprice(i) => i.$method($($arg),*),
            Ind::Roc(i) => i.$method($($arg),*),
            Ind::Mom(i) => i.$method($($arg),*),
            Ind::Obv(i) => i.$method($($arg),*),
            Ind::Natr(i) => i.$method($($arg),*),
            Ind::Dema(i) => i.$method($($arg),*),
            Ind::Tema(i) => i.$method($($arg),*),
            Ind::Ppo(i) => i.$method($($arg),*),
            Ind::Trix(i) => i.$method($($arg),*),
            Ind::Tsi(i) => i.$method($($arg),*),
            Ind::Wma(i) => i.$method($($arg),*),
            Ind::Trima(i) => i.$method($($arg),*),
            Ind::LinReg(i) => i.$method($($arg),*),
            Ind::Cmf(i) => i.$method($($arg),*),
            Ind::Cmo(i) => i.$method($($arg),*),
            Ind::Mfi(i) => i.$method($($arg),*),
            Ind::Aroon(i) => i.$method($($arg),*),
            Ind::Donchian(i) => i.$method($($arg),*),
            Ind::Kc(i) => i.$method($($arg),*),
            Ind::Dm(i) => i.$method($($arg),*),
            Ind::Vortex(i) => i.$method($($arg),*),
            Ind::Kama(i) => i.$method($($arg),*),
            Ind::Alma(i) => i.$method($($arg),*),
            Ind::Zlma(i) => i.$method($($arg),*),
            Ind::Uo(i) => i.$method($($arg),*),
            Ind::Psar(i) => i.$method($($arg),*),
            Ind::Squeeze(i) => i.$method($($arg),*),
            Ind::Fisher(i) => i.$method($($arg),*),
            Ind::Kvo(i) => i.$method($($arg),*),
            Ind::Vwap(i) => i.$method($($arg),*),
            Ind::AnchoredVwap(i) => i.$method($($arg),*),
        }
    };
}

impl Incremental for Ind {
    fn update(&mut self, bar: Ohlcv) {
        dispatch!(self, update, bar)
    }
    fn reset(&mut self) {
        dispatch!(self, reset)
    }
    fn value(&self) -> Option<f64> {
        dispatch!(self, value)
    }
    fn is_ready(&self) -> bool {
        dispatch!(self, is_ready)
    }
    fn secondary(&self, name: &str) -> Option<f64> {
        dispatch!(self, secondary, name)
    }
}

#[cfg(test)]
pub(crate) fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            ts_open: (i as i64) * 60_000,
            ts_close: (i as i64 + 1) * 60_000,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
        })
        .collect()
}
