//! Lookback category: Aroon, Donchian, Keltner Channel, Directional Movement,
//! Vortex — each driven by a monotonic deque or a sliding-window running sum.

use crate::indicators::core::Ema;
use crate::indicators::util::{MonotonicDeque, RingSum};
use crate::indicators::{Incremental, Ohlcv};

/// Aroon Up/Down. The window is `length + 1` bars (matches `pandas_ta`'s
/// `rolling(length + 1)`), not `length`.
#[derive(Debug, Clone)]
pub struct Aroon {
    length: usize,
    idx: usize,
    highs: MonotonicDeque,
    lows: MonotonicDeque,
    up: Option<f64>,
    down: Option<f64>,
}

impl Aroon {
    pub fn new(length: usize) -> Self {
        let window = length + 1;
        Self {
            length,
            idx: 0,
            highs: MonotonicDeque::new_max(window),
            lows: MonotonicDeque::new_min(window),
            up: None,
            down: None,
        }
    }
}

impl Incremental for Aroon {
    fn update(&mut self, bar: Ohlcv) {
        self.highs.push(self.idx, bar.high);
        self.lows.push(self.idx, bar.low);
        let window = self.length + 1;
        if self.idx + 1 >= window {
            let (_, hi_idx) = self.highs.extreme_entry().unwrap();
            let (_, lo_idx) = self.lows.extreme_entry().unwrap();
            let bars_since_high = self.idx - hi_idx;
            let bars_since_low = self.idx - lo_idx;
            self.up = Some((self.length as f64 - bars_since_high as f64) / self.length as f64 * 100.0);
            self.down = Some((self.length as f64 - bars_since_low as f64) / self.length as f64 * 100.0);
        }
        self.idx += 1;
    }
    fn reset(&mut self) {
        *self = Aroon::new(self.length);
    }
    fn value(&self) -> Option<f64> {
        self.up
    }
    fn is_ready(&self) -> bool {
        self.up.is_some()
    }
    fn secondary(&self, name: &str) -> Option<f64> {
        match name {
            "down" => self.down,
            "oscillator" => Some(self.up? - self.down?),
            _ => None,
        }
    }
}

/// Donchian Channel: highest high / lowest low over `period`, middle is
/// their average.
#[derive(Debug, Clone)]
pub struct Donchian {
    period: usize,
    idx: usize,
    highs: MonotonicDeque,
    lows: MonotonicDeque,
}

impl Donchian {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            idx: 0,
            highs: MonotonicDeque::new_max(period),
            lows: MonotonicDeque::new_min(period),
        }
    }

    pub fn upper(&self) -> Option<f64> {
        self.highs.extreme()
    }
    pub fn lower(&self) -> Option<f64> {
        self.lows.extreme()
    }
}

impl Incremental for Donchian {
    fn update(&mut self, bar: Ohlcv) {
        self.highs.push(self.idx, bar.high);
        self.lows.push(self.idx, bar.low);
        self.idx += 1;
    }
    fn reset(&mut self) {
        *self = Donchian::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        if self.idx < self.period {
            return None;
        }
        Some((self.upper()? + self.lower()?) / 2.0)
    }
    fn is_ready(&self) -> bool {
        self.idx >= self.period
    }
    fn secondary(&self, name: &str) -> Option<f64> {
        if self.idx < self.period {
            return None;
        }
        match name {
            "upper" => self.upper(),
            "lower" => self.lower(),
            _ => None,
        }
    }
}

/// Keltner Channel: EMA basis +- multiplier * EMA(true range), both legs
/// EMA-smoothed per `pandas_ta.kc()` default (not ATR's Wilder RMA).
#[derive(Debug, Clone)]
pub struct Kc {
    basis: Ema,
    tr_ema: Ema,
    prev_close: Option<f64>,
    multiplier: f64,
}

impl Kc {
    pub fn new(period: usize, multiplier: f64) -> Self {
        Self {
            basis: Ema::new(period),
            tr_ema: Ema::new(period),
            prev_close: None,
            multiplier,
        }
    }

    fn true_range(&self, bar: Ohlcv) -> f64 {
        match self.prev_close {
            None => bar.high - bar.low,
            Some(pc) => (bar.high - bar.low).max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        }
    }

    pub fn upper(&self) -> Option<f64> {
        Some(self.basis.value()? + self.multiplier * self.tr_ema.value()?)
    }
    pub fn lower(&self) -> Option<f64> {
        Some(self.basis.value()? - self.multiplier * self.tr_ema.value()?)
    }
}

impl Incremental for Kc {
    fn update(&mut self, bar: Ohlcv) {
        let tr = self.true_range(bar);
        self.prev_close = Some(bar.close);
        self.basis.update(bar);
        self.tr_ema.update_value(tr);
    }
    fn reset(&mut self) {
        let (p, m) = (self.basis.period(), self.multiplier);
        *self = Kc::new(p, m);
    }
    fn value(&self) -> Option<f64> {
        self.basis.value()
    }
    fn is_ready(&self) -> bool {
        self.basis.is_ready() && self.tr_ema.is_ready()
    }
    fn secondary(&self, name: &str) -> Option<f64> {
        match name {
            "upper" => self.upper(),
            "lower" => self.lower(),
            _ => None,
        }
    }
}

/// Directional Movement (+DM/-DM), Wilder cumulative smoothing seeded from
/// the plain sum of the first `length - 1` raw DM values (not SMA-seeded
/// like RSI/ATR — a deliberate difference, see SPEC_FULL.md §4.2).
#[derive(Debug, Clone)]
pub struct Dm {
    length: usize,
    prev_high: Option<f64>,
    prev_low: Option<f64>,
    seed_plus: RingSum,
    seed_minus: RingSum,
    plus: Option<f64>,
    minus: Option<f64>,
}

impl Dm {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            prev_high: None,
            prev_low: None,
            seed_plus: RingSum::new(length.saturating_sub(1).max(1)),
            seed_minus: RingSum::new(length.saturating_sub(1).max(1)),
            plus: None,
            minus: None,
        }
    }

    pub fn plus_dm(&self) -> Option<f64> {
        self.plus
    }
    pub fn minus_dm(&self) -> Option<f64> {
        self.minus
    }
}

impl Incremental for Dm {
    fn update(&mut self, bar: Ohlcv) {
        let (Some(ph), Some(pl)) = (self.prev_high, self.prev_low) else {
            self.prev_high = Some(bar.high);
            self.prev_low = Some(bar.low);
            return;
        };
        let up_move = bar.high - ph;
        let down_move = pl - bar.low;
        let plus_dm = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        let minus_dm = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };
        self.prev_high = Some(bar.high);
        self.prev_low = Some(bar.low);

        match (self.plus, self.minus) {
            (None, None) => {
                self.seed_plus.push(plus_dm);
                self.seed_minus.push(minus_dm);
                if self.seed_plus.is_full() {
                    self.plus = Some(self.seed_plus.sum());
                    self.minus = Some(self.seed_minus.sum());
                }
            }
            (Some(p), Some(m)) => {
                let n = self.length as f64;
                self.plus = Some(p - p / n + plus_dm);
                self.minus = Some(m - m / n + minus_dm);
            }
            _ => unreachable!(),
        }
    }
    fn reset(&mut self) {
        *self = Dm::new(self.length);
    }
    fn value(&self) -> Option<f64> {
        Some(self.plus? - self.minus?)
    }
    fn is_ready(&self) -> bool {
        self.plus.is_some()
    }
    fn secondary(&self, name: &str) -> Option<f64> {
        match name {
            "plus" => self.plus,
            "minus" => self.minus,
            _ => None,
        }
    }
}

/// Vortex Indicator: VI+ and VI- as ratios of summed directional movement
/// to summed true range over a window.
#[derive(Debug, Clone)]
pub struct Vortex {
    period: usize,
    prev_high: Option<f64>,
    prev_low: Option<f64>,
    prev_close: Option<f64>,
    vm_plus: RingSum,
    vm_minus: RingSum,
    tr: RingSum,
    vi_plus: Option<f64>,
    vi_minus: Option<f64>,
}

impl Vortex {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_high: None,
            prev_low: None,
            prev_close: None,
            vm_plus: RingSum::new(period),
            vm_minus: RingSum::new(period),
            tr: RingSum::new(period),
            vi_plus: None,
            vi_minus: None,
        }
    }

    pub fn vi_minus(&self) -> Option<f64> {
        self.vi_minus
    }
}

impl Incremental for Vortex {
    fn update(&mut self, bar: Ohlcv) {
        let (Some(ph), Some(pl), Some(pc)) = (self.prev_high, self.prev_low, self.prev_close) else {
            self.prev_high = Some(bar.high);
            self.prev_low = Some(bar.low);
            self.prev_close = Some(bar.close);
            return;
        };
        let vm_p = (bar.high - pl).abs();
        let vm_m = (bar.low - ph).abs();
        let tr = (bar.high - bar.low).max((bar.high - pc).abs()).max((bar.low - pc).abs());

        self.vm_plus.push(vm_p);
        self.vm_minus.push(vm_m);
        self.tr.push(tr);

        self.prev_high = Some(bar.high);
        self.prev_low = Some(bar.low);
        self.prev_close = Some(bar.close);

        if self.tr.is_full() {
            let tr_sum = self.tr.sum();
            self.vi_plus = if tr_sum == 0.0 { None } else { Some(self.vm_plus.sum() / tr_sum) };
            self.vi_minus = if tr_sum == 0.0 { None } else { Some(self.vm_minus.sum() / tr_sum) };
        }
    }
    fn reset(&mut self) {
        *self = Vortex::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        self.vi_plus
    }
    fn is_ready(&self) -> bool {
        self.vi_plus.is_some()
    }
    fn secondary(&self, name: &str) -> Option<f64> {
        match name {
            "minus" => self.vi_minus,
            _ => None,
        }
    }
}
