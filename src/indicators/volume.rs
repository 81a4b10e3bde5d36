//! Volume category: Klinger Volume Oscillator, VWAP, Anchored VWAP.
//!
//! All three skip accumulation on a NaN volume/close bar (the volume
//! running-sum policy from spec.md §4.2) rather than poisoning state.

use crate::indicators::core::Ema;
use crate::indicators::{Incremental, Ohlcv};

/// Klinger Volume Oscillator: `EMA(volume_force, short) - EMA(volume_force, long)`.
#[derive(Debug, Clone)]
pub struct Kvo {
    prev_hlc3: Option<f64>,
    prev_trend: i8,
    prev_dm: f64,
    cm: f64,
    short: Ema,
    long: Ema,
    signal: Ema,
    value: Option<f64>,
}

impl Kvo {
    pub fn new(short: usize, long: usize, signal: usize) -> Self {
        Self {
            prev_hlc3: None,
            prev_trend: 0,
            prev_dm: 0.0,
            cm: 0.0,
            short: Ema::new(short),
            long: Ema::new(long),
            signal: Ema::new(signal),
            value: None,
        }
    }

    pub fn signal_value(&self) -> Option<f64> {
        self.signal.value()
    }
}

impl Incremental for Kvo {
    fn update(&mut self, bar: Ohlcv) {
        if bar.volume.is_nan() {
            return;
        }
        let hlc3 = (bar.high + bar.low + bar.close) / 3.0;
        let dm = bar.high - bar.low;
        let Some(prev_hlc3) = self.prev_hlc3 else {
            self.prev_hlc3 = Some(hlc3);
            self.prev_dm = dm;
            return;
        };
        let trend: i8 = if hlc3 > prev_hlc3 { 1 } else { -1 };
        self.cm = if trend == self.prev_trend || self.prev_trend == 0 {
            self.cm + dm
        } else {
            self.prev_dm + dm
        };
        let ratio = if self.cm == 0.0 { 0.0 } else { 2.0 * (dm / self.cm) - 1.0 };
        let vf = bar.volume * ratio.abs() * trend as f64 * 100.0;

        self.short.update_value(vf);
        self.long.update_value(vf);
        if let (Some(s), Some(l)) = (self.short.value(), self.long.value()) {
            let kvo = s - l;
            self.value = Some(kvo);
            self.signal.update_value(kvo);
        }

        self.prev_hlc3 = Some(hlc3);
        self.prev_trend = trend;
        self.prev_dm = dm;
    }
    fn reset(&mut self) {
        let (s, l, sig) = (self.short.period(), self.long.period(), self.signal.period());
        *self = Kvo::new(s, l, sig);
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

/// VWAP anchor mode: reset the cumulative price*volume / volume sums at a
/// session boundary, or never (`None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VwapAnchor {
    Daily,
    Weekly,
    None,
}

/// Volume Weighted Average Price. Weekly boundary is Monday-based: day
/// index 0 is the Unix-epoch Thursday, so `(day_index + 3) / 7` (integer
/// division) increments exactly at each Monday — the Open Question in
/// spec.md §9 resolved this way (documented in DESIGN.md).
#[derive(Debug, Clone)]
pub struct Vwap {
    anchor: VwapAnchor,
    anchor_key: Option<i64>,
    cum_pv: f64,
    cum_v: f64,
    value: Option<f64>,
}

impl Vwap {
    pub fn new(anchor: VwapAnchor) -> Self {
        Self {
            anchor,
            anchor_key: None,
            cum_pv: 0.0,
            cum_v: 0.0,
            value: None,
        }
    }

    fn anchor_key_for(&self, ts_close_ms: i64) -> Option<i64> {
        const MS_PER_DAY: i64 = 86_400_000;
        match self.anchor {
            VwapAnchor::None => None,
            VwapAnchor::Daily => Some(ts_close_ms / MS_PER_DAY),
            VwapAnchor::Weekly => {
                let day_index = ts_close_ms / MS_PER_DAY;
                Some((day_index + 3) / 7)
            }
        }
    }

    fn maybe_reset(&mut self, ts_close_ms: i64) {
        let Some(key) = self.anchor_key_for(ts_close_ms) else {
            return;
        };
        if self.anchor_key != Some(key) {
            self.anchor_key = Some(key);
            self.cum_pv = 0.0;
            self.cum_v = 0.0;
        }
    }

    pub fn update_at(&mut self, bar: Ohlcv, ts_close_ms: i64) {
        if bar.volume.is_nan() || bar.close.is_nan() {
            return;
        }
        self.maybe_reset(ts_close_ms);
        let tp = (bar.high + bar.low + bar.close) / 3.0;
        self.cum_pv += tp * bar.volume;
        self.cum_v += bar.volume;
        self.value = if self.cum_v == 0.0 { None } else { Some(self.cum_pv / self.cum_v) };
    }
}

impl Incremental for Vwap {
    fn update(&mut self, bar: Ohlcv) {
        // `Ohlcv` carries no timestamp, so the generic `Incremental` path
        // can't see session boundaries; `SymbolRuntime::ingest` special-cases
        // `Ind::Vwap` and calls `update_at` with the bar's `ts_close`
        // instead. This impl only exists to satisfy the trait and behaves
        // as a never-resetting VWAP if ever called directly.
        if bar.volume.is_nan() || bar.close.is_nan() {
            return;
        }
        let tp = (bar.high + bar.low + bar.close) / 3.0;
        self.cum_pv += tp * bar.volume;
        self.cum_v += bar.volume;
        self.value = if self.cum_v == 0.0 { None } else { Some(self.cum_pv / self.cum_v) };
    }
    fn reset(&mut self) {
        *self = Vwap::new(self.anchor);
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

/// Anchored VWAP: resets its cumulative sums when a structure
/// pivot-completion event fires. When two reset events are observed for
/// the same bar, only the last one applied is honoured — per the Open
/// Question resolution in spec.md §9 (no queued resets, no double reset).
#[derive(Debug, Clone, Default)]
pub struct AnchoredVwap {
    cum_pv: f64,
    cum_v: f64,
    value: Option<f64>,
}

impl AnchoredVwap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `reset` is true if any structure anchor event fired on this bar
    /// (already deduplicated by the caller to "only the last observed").
    pub fn update_with_reset(&mut self, bar: Ohlcv, reset: bool) {
        if reset {
            self.cum_pv = 0.0;
            self.cum_v = 0.0;
        }
        if bar.volume.is_nan() || bar.close.is_nan() {
            return;
        }
        let tp = (bar.high + bar.low + bar.close) / 3.0;
        self.cum_pv += tp * bar.volume;
        self.cum_v += bar.volume;
        self.value = if self.cum_v == 0.0 { None } else { Some(self.cum_pv / self.cum_v) };
    }
}

impl Incremental for AnchoredVwap {
    fn update(&mut self, bar: Ohlcv) {
        // As with `Vwap` above: `SymbolRuntime::ingest` special-cases
        // `Ind::AnchoredVwap` and calls `update_with_reset` with the bar's
        // structure anchor signal directly. This impl never sees a reset.
        self.update_with_reset(bar, false);
    }
    fn reset(&mut self) {
        *self = AnchoredVwap::new();
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}
