//! Buffer-based category: WMA, TRIMA, Linear Regression, CMF, CMO, MFI —
//! each keeps a running weighted-sum alongside a plain running sum so the
//! per-bar update stays O(1).

use crate::indicators::core::Sma;
use crate::indicators::util::RingSum;
use crate::indicators::{Incremental, Ohlcv};
use std::collections::VecDeque;

/// Weighted moving average: weights `1..=n`, heaviest on the newest bar.
/// Maintains a running weighted-sum alongside the plain running sum so a
/// slide is O(1): `W' = W - S + n*v_new`, `S' = S - v_old + v_new`.
#[derive(Debug, Clone)]
pub struct Wma {
    period: usize,
    window: RingSum,
    weighted_sum: f64,
}

impl Wma {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: RingSum::new(period),
            weighted_sum: 0.0,
        }
    }

    fn weight_denominator(&self) -> f64 {
        let n = self.period as f64;
        n * (n + 1.0) / 2.0
    }
}

impl Incremental for Wma {
    fn update(&mut self, bar: Ohlcv) {
        let v = bar.close;
        let s_old = self.window.sum();
        let evicted = self.window.push(v);
        let n = self.period as f64;
        match evicted {
            Some(_) => {
                self.weighted_sum = self.weighted_sum - s_old + n * v;
            }
            None if self.window.is_full() => {
                // just became full: compute weighted sum from scratch (weight i+1 on i-th oldest).
                self.weighted_sum = self
                    .window
                    .iter()
                    .enumerate()
                    .map(|(i, &y)| (i as f64 + 1.0) * y)
                    .sum();
            }
            None => {}
        }
    }
    fn reset(&mut self) {
        *self = Wma::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        self.window.is_full().then(|| self.weighted_sum / self.weight_denominator())
    }
    fn is_ready(&self) -> bool {
        self.window.is_full()
    }
}

/// Triangular moving average: SMA-of-SMA with window sizes chosen so the
/// overall weighting is triangular (matches `pandas_ta.trima`'s split).
#[derive(Debug, Clone)]
pub struct Trima {
    inner: Sma,
    outer: Sma,
}

impl Trima {
    pub fn new(period: usize) -> Self {
        let (w1, w2) = if period % 2 == 0 {
            (period / 2 + 1, period / 2)
        } else {
            let half = (period + 1) / 2;
            (half, half)
        };
        Self {
            inner: Sma::new(w1),
            outer: Sma::new(w2),
        }
    }
}

impl Incremental for Trima {
    fn update(&mut self, bar: Ohlcv) {
        self.inner.update_value(bar.close);
        if let Some(v) = self.inner.value() {
            self.outer.update_value(v);
        }
    }
    fn reset(&mut self) {
        self.inner.reset();
        self.outer.reset();
    }
    fn value(&self) -> Option<f64> {
        self.outer.value()
    }
    fn is_ready(&self) -> bool {
        self.outer.is_ready()
    }
}

/// Linear regression forecast: the value of the least-squares line through
/// the window at its most recent point. `Sxy` is maintained incrementally
/// via the standard sliding-window identity; `Sx`/`Sxx` are constants for a
/// fixed window size.
#[derive(Debug, Clone)]
pub struct LinReg {
    period: usize,
    window: RingSum,
    sxy: f64,
}

impl LinReg {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: RingSum::new(period),
            sxy: 0.0,
        }
    }
}

impl Incremental for LinReg {
    fn update(&mut self, bar: Ohlcv) {
        let v = bar.close;
        let sy_old = self.window.sum();
        let evicted = self.window.push(v);
        let n = self.period as f64;
        match evicted {
            Some(y0) => {
                self.sxy = self.sxy - (sy_old - y0) + (n - 1.0) * v;
            }
            None if self.window.is_full() => {
                self.sxy = self
                    .window
                    .iter()
                    .enumerate()
                    .map(|(i, &y)| i as f64 * y)
                    .sum();
            }
            None => {}
        }
    }
    fn reset(&mut self) {
        *self = LinReg::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        if !self.window.is_full() {
            return None;
        }
        let n = self.period as f64;
        let sx = n * (n - 1.0) / 2.0;
        let sxx = (n - 1.0) * n * (2.0 * n - 1.0) / 6.0;
        let sy = self.window.sum();
        let denom = n * sxx - sx * sx;
        if denom == 0.0 {
            return Some(self.window.mean());
        }
        let slope = (n * self.sxy - sx * sy) / denom;
        let intercept = (sy - slope * sx) / n;
        Some(intercept + slope * (n - 1.0))
    }
    fn is_ready(&self) -> bool {
        self.window.is_full()
    }
}

/// Chaikin Money Flow: `sum(money_flow_volume) / sum(volume)` over a window.
#[derive(Debug, Clone)]
pub struct Cmf {
    period: usize,
    mfv: VecDeque<f64>,
    vol: VecDeque<f64>,
    mfv_sum: f64,
    vol_sum: f64,
}

impl Cmf {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            mfv: VecDeque::with_capacity(period),
            vol: VecDeque::with_capacity(period),
            mfv_sum: 0.0,
            vol_sum: 0.0,
        }
    }
}

impl Incremental for Cmf {
    fn update(&mut self, bar: Ohlcv) {
        if bar.volume.is_nan() {
            return;
        }
        let range = bar.high - bar.low;
        let mfv = if range == 0.0 {
            0.0
        } else {
            ((bar.close - bar.low) - (bar.high - bar.close)) / range * bar.volume
        };
        self.mfv.push_back(mfv);
        self.vol.push_back(bar.volume);
        self.mfv_sum += mfv;
        self.vol_sum += bar.volume;
        if self.mfv.len() > self.period {
            self.mfv_sum -= self.mfv.pop_front().unwrap();
            self.vol_sum -= self.vol.pop_front().unwrap();
        }
    }
    fn reset(&mut self) {
        *self = Cmf::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        if self.mfv.len() < self.period || self.vol_sum == 0.0 {
            return None;
        }
        Some(self.mfv_sum / self.vol_sum)
    }
    fn is_ready(&self) -> bool {
        self.mfv.len() == self.period
    }
}

/// Chande Momentum Oscillator: `(sum_up - sum_down) / (sum_up + sum_down) * 100`
/// over plain (non-Wilder) running sums of up/down price changes.
#[derive(Debug, Clone)]
pub struct Cmo {
    period: usize,
    prev_close: Option<f64>,
    up: RingSum,
    down: RingSum,
}

impl Cmo {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            up: RingSum::new(period),
            down: RingSum::new(period),
        }
    }
}

impl Incremental for Cmo {
    fn update(&mut self, bar: Ohlcv) {
        let Some(prev) = self.prev_close else {
            self.prev_close = Some(bar.close);
            return;
        };
        self.prev_close = Some(bar.close);
        let change = bar.close - prev;
        self.up.push(change.max(0.0));
        self.down.push((-change).max(0.0));
    }
    fn reset(&mut self) {
        *self = Cmo::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        if !self.up.is_full() {
            return None;
        }
        let (u, d) = (self.up.sum(), self.down.sum());
        if u + d == 0.0 {
            Some(0.0)
        } else {
            Some((u - d) / (u + d) * 100.0)
        }
    }
    fn is_ready(&self) -> bool {
        self.up.is_full()
    }
}

/// Money Flow Index: volume-weighted RSI analogue over typical price.
#[derive(Debug, Clone)]
pub struct Mfi {
    period: usize,
    prev_tp: Option<f64>,
    pos: RingSum,
    neg: RingSum,
}

impl Mfi {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_tp: None,
            pos: RingSum::new(period),
            neg: RingSum::new(period),
        }
    }
}

impl Incremental for Mfi {
    fn update(&mut self, bar: Ohlcv) {
        if bar.volume.is_nan() {
            return;
        }
        let tp = (bar.high + bar.low + bar.close) / 3.0;
        let raw_mf = tp * bar.volume;
        let Some(prev) = self.prev_tp else {
            self.prev_tp = Some(tp);
            return;
        };
        self.prev_tp = Some(tp);
        if tp > prev {
            self.pos.push(raw_mf);
            self.neg.push(0.0);
        } else if tp < prev {
            self.pos.push(0.0);
            self.neg.push(raw_mf);
        } else {
            self.pos.push(0.0);
            self.neg.push(0.0);
        }
    }
    fn reset(&mut self) {
        *self = Mfi::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        if !self.pos.is_full() {
            return None;
        }
        let (p, n) = (self.pos.sum(), self.neg.sum());
        if n == 0.0 {
            Some(100.0)
        } else {
            Some(100.0 - 100.0 / (1.0 + p / n))
        }
    }
    fn is_ready(&self) -> bool {
        self.pos.is_full()
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
            volume: 100.0,
        }
    }

    #[test]
    fn wma_matches_hand_computed_weights() {
        let mut wma = Wma::new(3);
        for v in [10.0, 20.0, 30.0] {
            wma.update(bar(v));
        }
        // weights 1,2,3 on 10,20,30 -> (10+40+90)/6 = 23.333...
        assert!((wma.value().unwrap() - 23.333333333333332).abs() < 1e-9);
    }

    #[test]
    fn wma_slides_correctly_after_warmup() {
        let mut wma = Wma::new(3);
        for v in [10.0, 20.0, 30.0, 40.0] {
            wma.update(bar(v));
        }
        // window now 20,30,40 -> (20+60+120)/6 = 33.333...
        assert!((wma.value().unwrap() - 33.333333333333336).abs() < 1e-9);
    }

    #[test]
    fn linreg_on_perfect_line_matches_last_point() {
        let mut lr = LinReg::new(4);
        for v in [1.0, 2.0, 3.0, 4.0] {
            lr.update(bar(v));
        }
        assert!((lr.value().unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn cmf_zero_range_bar_does_not_divide_by_zero() {
        let mut cmf = Cmf::new(2);
        cmf.update(Ohlcv { open: 5.0, high: 5.0, low: 5.0, close: 5.0, volume: 10.0 });
        cmf.update(Ohlcv { open: 5.0, high: 5.0, low: 5.0, close: 5.0, volume: 10.0 });
        assert_eq!(cmf.value(), Some(0.0));
    }
}
