//! Trivial-update indicator category: OHLC4, Midprice, ROC, MOM, OBV, NATR.

use crate::indicators::core::Ema;
use crate::indicators::util::MonotonicDeque;
use crate::indicators::{Incremental, Ohlcv};
use std::collections::VecDeque;

/// `(O+H+L+C)/4`, no warmup.
#[derive(Debug, Clone, Default)]
pub struct Ohlc4 {
    value: Option<f64>,
}

impl Incremental for Ohlc4 {
    fn update(&mut self, bar: Ohlcv) {
        self.value = Some((bar.open + bar.high + bar.low + bar.close) / 4.0);
    }
    fn reset(&mut self) {
        self.value = None;
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

/// `(H+L)/2` over a rolling window's extremes (midpoint of the highest
/// high / lowest low, not the current bar's hl2).
#[derive(Debug, Clone)]
pub struct Midprice {
    period: usize,
    idx: usize,
    highs: MonotonicDeque,
    lows: MonotonicDeque,
}

impl Midprice {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            idx: 0,
            highs: MonotonicDeque::new_max(period),
            lows: MonotonicDeque::new_min(period),
        }
    }
}

impl Incremental for Midprice {
    fn update(&mut self, bar: Ohlcv) {
        self.highs.push(self.idx, bar.high);
        self.lows.push(self.idx, bar.low);
        self.idx += 1;
    }
    fn reset(&mut self) {
        *self = Midprice::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        if self.idx < self.period {
            return None;
        }
        Some((self.highs.extreme()? + self.lows.extreme()?) / 2.0)
    }
    fn is_ready(&self) -> bool {
        self.idx >= self.period
    }
}

/// Rate of change: `(close / close[n periods ago] - 1) * 100`.
#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    history: VecDeque<f64>,
    value: Option<f64>,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            history: VecDeque::with_capacity(period + 1),
            value: None,
        }
    }
}

impl Incremental for Roc {
    fn update(&mut self, bar: Ohlcv) {
        self.history.push_back(bar.close);
        if self.history.len() > self.period + 1 {
            self.history.pop_front();
        }
        if self.history.len() == self.period + 1 {
            let past = self.history.front().copied().unwrap();
            self.value = if past == 0.0 {
                None
            } else {
                Some((bar.close / past - 1.0) * 100.0)
            };
        }
    }
    fn reset(&mut self) {
        *self = Roc::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.history.len() == self.period + 1
    }
}

/// Momentum: `close - close[n periods ago]`.
#[derive(Debug, Clone)]
pub struct Mom {
    period: usize,
    history: VecDeque<f64>,
    value: Option<f64>,
}

impl Mom {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            history: VecDeque::with_capacity(period + 1),
            value: None,
        }
    }
}

impl Incremental for Mom {
    fn update(&mut self, bar: Ohlcv) {
        self.history.push_back(bar.close);
        if self.history.len() > self.period + 1 {
            self.history.pop_front();
        }
        if self.history.len() == self.period + 1 {
            self.value = Some(bar.close - self.history.front().copied().unwrap());
        }
    }
    fn reset(&mut self) {
        *self = Mom::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.history.len() == self.period + 1
    }
}

/// On-Balance Volume: a running sum, +volume on a higher close, -volume on
/// a lower close, unchanged on an equal close. A NaN close skips the bar
/// (volume running-sum policy per spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct Obv {
    prev_close: Option<f64>,
    cum: f64,
    seen_any: bool,
}

impl Incremental for Obv {
    fn update(&mut self, bar: Ohlcv) {
        if bar.close.is_nan() || bar.volume.is_nan() {
            return;
        }
        if let Some(prev) = self.prev_close {
            if bar.close > prev {
                self.cum += bar.volume;
            } else if bar.close < prev {
                self.cum -= bar.volume;
            }
        }
        self.prev_close = Some(bar.close);
        self.seen_any = true;
    }
    fn reset(&mut self) {
        *self = Obv::default();
    }
    fn value(&self) -> Option<f64> {
        self.seen_any.then_some(self.cum)
    }
    fn is_ready(&self) -> bool {
        self.seen_any
    }
}

/// Normalised ATR: `ATR / close * 100`, true range smoothed with **EMA**
/// (matching `pandas_ta`'s default `mamode='ema'`, a deliberate departure
/// from `Atr`'s Wilder smoothing — see SPEC_FULL.md §4.2).
#[derive(Debug, Clone)]
pub struct Natr {
    period: usize,
    prev_close: Option<f64>,
    tr_ema: Ema,
    value: Option<f64>,
}

impl Natr {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            tr_ema: Ema::new(period),
            value: None,
        }
    }

    fn true_range(&self, bar: Ohlcv) -> f64 {
        match self.prev_close {
            None => bar.high - bar.low,
            Some(pc) => (bar.high - bar.low).max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        }
    }
}

impl Incremental for Natr {
    fn update(&mut self, bar: Ohlcv) {
        let tr = self.true_range(bar);
        self.prev_close = Some(bar.close);
        self.tr_ema.update_value(tr);
        if let Some(atr) = self.tr_ema.value() {
            self.value = if bar.close == 0.0 {
                None
            } else {
                Some(atr / bar.close * 100.0)
            };
        }
    }
    fn reset(&mut self) {
        *self = Natr::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}
