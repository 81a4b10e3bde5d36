//! EMA-composable category: DEMA, TEMA, PPO, TRIX, TSI — each built from
//! chained `Ema` instances; warmup composes (lookback ~= sum of stages).

use crate::indicators::core::Ema;
use crate::indicators::{Incremental, Ohlcv};

/// Double EMA: `2*EMA1 - EMA(EMA1)`.
#[derive(Debug, Clone)]
pub struct Dema {
    e1: Ema,
    e2: Ema,
    value: Option<f64>,
}

impl Dema {
    pub fn new(period: usize) -> Self {
        Self {
            e1: Ema::new(period),
            e2: Ema::new(period),
            value: None,
        }
    }
}

impl Incremental for Dema {
    fn update(&mut self, bar: Ohlcv) {
        self.e1.update(bar);
        if let Some(v1) = self.e1.value() {
            self.e2.update_value(v1);
            if let Some(v2) = self.e2.value() {
                self.value = Some(2.0 * v1 - v2);
            }
        }
    }
    fn reset(&mut self) {
        let p = self.e1.period();
        *self = Dema::new(p);
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

/// Triple EMA: `3*EMA1 - 3*EMA2 + EMA3`.
#[derive(Debug, Clone)]
pub struct Tema {
    e1: Ema,
    e2: Ema,
    e3: Ema,
    value: Option<f64>,
}

impl Tema {
    pub fn new(period: usize) -> Self {
        Self {
            e1: Ema::new(period),
            e2: Ema::new(period),
            e3: Ema::new(period),
            value: None,
        }
    }
}

impl Incremental for Tema {
    fn update(&mut self, bar: Ohlcv) {
        self.e1.update(bar);
        let Some(v1) = self.e1.value() else { return };
        self.e2.update_value(v1);
        let Some(v2) = self.e2.value() else { return };
        self.e3.update_value(v2);
        if let Some(v3) = self.e3.value() {
            self.value = Some(3.0 * v1 - 3.0 * v2 + v3);
        }
    }
    fn reset(&mut self) {
        let p = self.e1.period();
        *self = Tema::new(p);
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

/// Percentage Price Oscillator: `(fast_ema - slow_ema) / slow_ema * 100`,
/// with a signal EMA of the PPO line.
#[derive(Debug, Clone)]
pub struct Ppo {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    value: Option<f64>,
}

impl Ppo {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            value: None,
        }
    }

    pub fn signal_value(&self) -> Option<f64> {
        self.signal.value()
    }
}

impl Incremental for Ppo {
    fn update(&mut self, bar: Ohlcv) {
        self.fast.update(bar);
        self.slow.update(bar);
        if let (Some(f), Some(s)) = (self.fast.value(), self.slow.value()) {
            if s != 0.0 {
                let ppo = (f - s) / s * 100.0;
                self.value = Some(ppo);
                self.signal.update_value(ppo);
            }
        }
    }
    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.signal.reset();
        self.value = None;
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
    fn secondary(&self, name: &str) -> Option<f64> {
        match name {
            "signal" => self.signal_value(),
            _ => None,
        }
    }
}

/// TRIX: rate of change (in percent) of a triple-smoothed EMA of `close`.
#[derive(Debug, Clone)]
pub struct Trix {
    e1: Ema,
    e2: Ema,
    e3: Ema,
    prev_triple: Option<f64>,
    value: Option<f64>,
}

impl Trix {
    pub fn new(period: usize) -> Self {
        Self {
            e1: Ema::new(period),
            e2: Ema::new(period),
            e3: Ema::new(period),
            prev_triple: None,
            value: None,
        }
    }
}

impl Incremental for Trix {
    fn update(&mut self, bar: Ohlcv) {
        self.e1.update(bar);
        let Some(v1) = self.e1.value() else { return };
        self.e2.update_value(v1);
        let Some(v2) = self.e2.value() else { return };
        self.e3.update_value(v2);
        let Some(v3) = self.e3.value() else { return };

        if let Some(prev) = self.prev_triple {
            self.value = if prev == 0.0 {
                None
            } else {
                Some((v3 - prev) / prev * 100.0)
            };
        }
        self.prev_triple = Some(v3);
    }
    fn reset(&mut self) {
        let p = self.e1.period();
        *self = Trix::new(p);
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

/// True Strength Index: double-EMA-smoothed momentum over double-EMA-smoothed
/// absolute momentum, scaled to +-100.
#[derive(Debug, Clone)]
pub struct Tsi {
    prev_close: Option<f64>,
    pc_long: Ema,
    pc_short: Ema,
    apc_long: Ema,
    apc_short: Ema,
    value: Option<f64>,
}

impl Tsi {
    pub fn new(long: usize, short: usize) -> Self {
        Self {
            prev_close: None,
            pc_long: Ema::new(long),
            pc_short: Ema::new(short),
            apc_long: Ema::new(long),
            apc_short: Ema::new(short),
            value: None,
        }
    }
}

impl Incremental for Tsi {
    fn update(&mut self, bar: Ohlcv) {
        let Some(prev) = self.prev_close else {
            self.prev_close = Some(bar.close);
            return;
        };
        self.prev_close = Some(bar.close);
        let change = bar.close - prev;
        self.pc_long.update_value(change);
        self.apc_long.update_value(change.abs());
        if let Some(smoothed) = self.pc_long.value() {
            self.pc_short.update_value(smoothed);
        }
        if let Some(smoothed_abs) = self.apc_long.value() {
            self.apc_short.update_value(smoothed_abs);
        }
        if let (Some(num), Some(den)) = (self.pc_short.value(), self.apc_short.value()) {
            self.value = if den == 0.0 { Some(0.0) } else { Some(num / den * 100.0) };
        }
    }
    fn reset(&mut self) {
        let (l, s) = (self.pc_long.period(), self.pc_short.period());
        *self = Tsi::new(l, s);
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64) -> Ohlcv {
        Ohlcv {
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn dema_converges_to_flat_price() {
        let mut dema = Dema::new(10);
        for _ in 0..60 {
            dema.update(bar(50.0));
        }
        assert!((dema.value().unwrap() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn tema_converges_to_flat_price() {
        let mut tema = Tema::new(8);
        for _ in 0..80 {
            tema.update(bar(25.0));
        }
        assert!((tema.value().unwrap() - 25.0).abs() < 1e-6);
    }
}
