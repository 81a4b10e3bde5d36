//! Adaptive category: KAMA, ALMA, ZLMA, Ultimate Oscillator.

use crate::indicators::core::Ema;
use crate::indicators::util::RingSum;
use crate::indicators::{Incremental, Ohlcv};
use std::collections::VecDeque;

/// Kaufman Adaptive Moving Average: the smoothing constant scales between
/// a fast and slow EMA constant by the efficiency ratio of the last
/// `period` bars. First value is the SMA of the first `period` closes;
/// the efficiency ratio and smoothing constant are computed only once the
/// change buffer is full.
#[derive(Debug, Clone)]
pub struct Kama {
    period: usize,
    fast_sc: f64,
    slow_sc: f64,
    closes: VecDeque<f64>,
    abs_changes: RingSum,
    prev_close: Option<f64>,
    value: Option<f64>,
}

impl Kama {
    pub fn new(period: usize, fast: usize, slow: usize) -> Self {
        Self {
            period,
            fast_sc: 2.0 / (fast as f64 + 1.0),
            slow_sc: 2.0 / (slow as f64 + 1.0),
            closes: VecDeque::with_capacity(period + 1),
            abs_changes: RingSum::new(period),
            prev_close: None,
            value: None,
        }
    }
}

impl Incremental for Kama {
    fn update(&mut self, bar: Ohlcv) {
        let close = bar.close;
        if let Some(prev) = self.prev_close {
            self.abs_changes.push((close - prev).abs());
        }
        self.prev_close = Some(close);
        self.closes.push_back(close);
        if self.closes.len() > self.period + 1 {
            self.closes.pop_front();
        }

        if self.value.is_none() {
            if self.closes.len() == self.period + 1 {
                let seed: f64 = self.closes.iter().skip(1).sum::<f64>() / self.period as f64;
                self.value = Some(seed);
            }
            return;
        }

        if !self.abs_changes.is_full() {
            return;
        }
        let change = (close - *self.closes.front().unwrap()).abs();
        let volatility = self.abs_changes.sum();
        let er = if volatility == 0.0 { 0.0 } else { change / volatility };
        let sc = (er * (self.fast_sc - self.slow_sc) + self.slow_sc).powi(2);
        let prev = self.value.unwrap();
        self.value = Some(prev + sc * (close - prev));
    }
    fn reset(&mut self) {
        let (p, fast, slow) = (
            self.period,
            (2.0 / self.fast_sc - 1.0).round() as usize,
            (2.0 / self.slow_sc - 1.0).round() as usize,
        );
        *self = Kama::new(p, fast, slow);
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

/// Arnaud Legoux Moving Average: Gaussian-weighted window. O(1) update
/// (push into a fixed buffer), O(n) on value read — a mathematical
/// limitation of the Gaussian-weighting definition, not a design defect
/// (same limitation documented for CCI's mean deviation).
#[derive(Debug, Clone)]
pub struct Alma {
    period: usize,
    window: VecDeque<f64>,
    weights: Vec<f64>,
    weight_sum: f64,
}

impl Alma {
    pub fn new(period: usize, offset: f64, sigma: f64) -> Self {
        let m = offset * (period as f64 - 1.0);
        let s = period as f64 / sigma;
        let weights: Vec<f64> = (0..period)
            .map(|i| (-((i as f64 - m).powi(2)) / (2.0 * s * s)).exp())
            .collect();
        let weight_sum = weights.iter().sum();
        Self {
            period,
            window: VecDeque::with_capacity(period),
            weights,
            weight_sum,
        }
    }
}

impl Incremental for Alma {
    fn update(&mut self, bar: Ohlcv) {
        self.window.push_back(bar.close);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
    }
    fn reset(&mut self) {
        self.window.clear();
    }
    fn value(&self) -> Option<f64> {
        if self.window.len() < self.period {
            return None;
        }
        let weighted: f64 = self
            .window
            .iter()
            .zip(self.weights.iter())
            .map(|(v, w)| v * w)
            .sum();
        Some(weighted / self.weight_sum)
    }
    fn is_ready(&self) -> bool {
        self.window.len() == self.period
    }
}

/// Zero-Lag EMA: an EMA of a de-lagged series `2*close - close[lag]`,
/// `lag = (period-1)/2`.
#[derive(Debug, Clone)]
pub struct Zlma {
    period: usize,
    lag: usize,
    history: VecDeque<f64>,
    ema: Ema,
}

impl Zlma {
    pub fn new(period: usize) -> Self {
        let lag = (period.saturating_sub(1)) / 2;
        Self {
            period,
            lag,
            history: VecDeque::with_capacity(lag + 1),
            ema: Ema::new(period),
        }
    }
}

impl Incremental for Zlma {
    fn update(&mut self, bar: Ohlcv) {
        self.history.push_back(bar.close);
        if self.history.len() > self.lag + 1 {
            self.history.pop_front();
        }
        if self.history.len() == self.lag + 1 {
            let lagged = *self.history.front().unwrap();
            let de_lagged = 2.0 * bar.close - lagged;
            self.ema.update_value(de_lagged);
        }
    }
    fn reset(&mut self) {
        *self = Zlma::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        self.ema.value()
    }
    fn is_ready(&self) -> bool {
        self.ema.is_ready()
    }
}

/// Ultimate Oscillator: a weighted blend of three nested buying-pressure /
/// true-range window ratios (periods `short < medium < long`).
#[derive(Debug, Clone)]
pub struct Uo {
    short: usize,
    medium: usize,
    long: usize,
    prev_close: Option<f64>,
    bp_short: RingSum,
    bp_medium: RingSum,
    bp_long: RingSum,
    tr_short: RingSum,
    tr_medium: RingSum,
    tr_long: RingSum,
    value: Option<f64>,
}

impl Uo {
    pub fn new(short: usize, medium: usize, long: usize) -> Self {
        Self {
            short,
            medium,
            long,
            prev_close: None,
            bp_short: RingSum::new(short),
            bp_medium: RingSum::new(medium),
            bp_long: RingSum::new(long),
            tr_short: RingSum::new(short),
            tr_medium: RingSum::new(medium),
            tr_long: RingSum::new(long),
            value: None,
        }
    }
}

impl Incremental for Uo {
    fn update(&mut self, bar: Ohlcv) {
        let Some(prev_close) = self.prev_close else {
            self.prev_close = Some(bar.close);
            return;
        };
        self.prev_close = Some(bar.close);
        let bp = bar.close - bar.low.min(prev_close);
        let tr = (bar.high.max(prev_close)) - (bar.low.min(prev_close));

        self.bp_short.push(bp);
        self.bp_medium.push(bp);
        self.bp_long.push(bp);
        self.tr_short.push(tr);
        self.tr_medium.push(tr);
        self.tr_long.push(tr);

        if self.tr_long.is_full() {
            let avg = |bp: &RingSum, tr: &RingSum| -> f64 {
                let t = tr.sum();
                if t == 0.0 { 0.0 } else { bp.sum() / t }
            };
            let a1 = avg(&self.bp_short, &self.tr_short);
            let a2 = avg(&self.bp_medium, &self.tr_medium);
            let a3 = avg(&self.bp_long, &self.tr_long);
            self.value = Some(100.0 * (4.0 * a1 + 2.0 * a2 + a3) / 7.0);
        }
    }
    fn reset(&mut self) {
        let (s, m, l) = (self.short, self.medium, self.long);
        *self = Uo::new(s, m, l);
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
        Ohlcv { open: close, high: close + 1.0, low: close - 1.0, close, volume: 10.0 }
    }

    #[test]
    fn kama_converges_to_flat_price() {
        let mut kama = Kama::new(10, 2, 30);
        for _ in 0..60 {
            kama.update(bar(42.0));
        }
        assert!((kama.value().unwrap() - 42.0).abs() < 1e-9);
    }

    #[test]
    fn alma_on_flat_series_equals_price() {
        let mut alma = Alma::new(9, 0.85, 6.0);
        for _ in 0..9 {
            alma.update(bar(7.0));
        }
        assert!((alma.value().unwrap() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn zlma_converges_to_flat_price() {
        let mut zlma = Zlma::new(10);
        for _ in 0..40 {
            zlma.update(bar(15.0));
        }
        assert!((zlma.value().unwrap() - 15.0).abs() < 1e-9);
    }
}
