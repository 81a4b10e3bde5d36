//! Stateful/multi-output category: Parabolic SAR, Squeeze Momentum, Fisher
//! Transform — each carries a small state machine beyond a plain window.

use crate::indicators::buffer_based::LinReg;
use crate::indicators::core::BBands;
use crate::indicators::lookback::{Donchian, Kc};
use crate::indicators::{Incremental, Ohlcv};

/// Parabolic SAR. Initial trend direction is derived from the bar 0->1
/// high/low comparison; band-clamping and reversal logic are ported
/// verbatim: SAR cannot cross the prior bar's high in a downtrend, or the
/// prior bar's low in an uptrend.
#[derive(Debug, Clone)]
pub struct Psar {
    af_step: f64,
    af_max: f64,
    af: f64,
    rising: Option<bool>,
    sar: Option<f64>,
    ep: f64,
    prev_bar: Option<Ohlcv>,
    prev_prev_bar: Option<Ohlcv>,
}

impl Psar {
    pub fn new(af_step: f64, af_max: f64) -> Self {
        Self {
            af_step,
            af_max,
            af: af_step,
            rising: None,
            sar: None,
            ep: 0.0,
            prev_bar: None,
            prev_prev_bar: None,
        }
    }

    pub fn direction(&self) -> Option<i8> {
        self.rising.map(|r| if r { 1 } else { -1 })
    }
}

impl Incremental for Psar {
    fn update(&mut self, bar: Ohlcv) {
        let Some(prev) = self.prev_bar else {
            self.prev_bar = Some(bar);
            return;
        };

        if self.rising.is_none() {
            // Seed from bar 0->1 high/low comparison.
            let rising = bar.close >= prev.close;
            self.rising = Some(rising);
            self.af = self.af_step;
            if rising {
                self.ep = bar.high.max(prev.high);
                self.sar = Some(prev.low.min(bar.low));
            } else {
                self.ep = bar.low.min(prev.low);
                self.sar = Some(prev.high.max(bar.high));
            }
            self.prev_prev_bar = Some(prev);
            self.prev_bar = Some(bar);
            return;
        }

        let prev_sar = self.sar.unwrap();
        let rising = self.rising.unwrap();
        let prior2_high = self.prev_prev_bar.map(|b| b.high).unwrap_or(prev.high);
        let prior2_low = self.prev_prev_bar.map(|b| b.low).unwrap_or(prev.low);

        let mut next_sar = prev_sar + self.af * (self.ep - prev_sar);
        let mut next_rising = rising;
        let mut next_ep = self.ep;
        let mut next_af = self.af;

        if rising {
            next_sar = next_sar.min(prev.low).min(prior2_low);
            if bar.low < next_sar {
                // reversal to falling
                next_rising = false;
                next_sar = self.ep.max(bar.high);
                next_ep = bar.low;
                next_af = self.af_step;
            } else {
                if bar.high > self.ep {
                    next_ep = bar.high;
                    next_af = (self.af + self.af_step).min(self.af_max);
                }
            }
        } else {
            next_sar = next_sar.max(prev.high).max(prior2_high);
            if bar.high > next_sar {
                // reversal to rising
                next_rising = true;
                next_sar = self.ep.min(bar.low);
                next_ep = bar.high;
                next_af = self.af_step;
            } else {
                if bar.low < self.ep {
                    next_ep = bar.low;
                    next_af = (self.af + self.af_step).min(self.af_max);
                }
            }
        }

        self.sar = Some(next_sar);
        self.rising = Some(next_rising);
        self.ep = next_ep;
        self.af = next_af;
        self.prev_prev_bar = Some(prev);
        self.prev_bar = Some(bar);
    }

    fn reset(&mut self) {
        let (step, max) = (self.af_step, self.af_max);
        *self = Psar::new(step, max);
    }
    fn value(&self) -> Option<f64> {
        self.sar
    }
    fn is_ready(&self) -> bool {
        self.sar.is_some()
    }
    fn secondary(&self, name: &str) -> Option<f64> {
        match name {
            "direction" => self.direction().map(|d| d as f64),
            _ => None,
        }
    }
}

/// Squeeze momentum: on when the Bollinger Bands sit fully inside the
/// Keltner Channel; momentum is a linear-regression forecast of price
/// deviation from the midline of Donchian highest-high/lowest-low blended
/// with the SMA basis.
#[derive(Debug, Clone)]
pub struct Squeeze {
    bb: BBands,
    kc: Kc,
    donchian: Donchian,
    linreg: LinReg,
    momentum: Option<f64>,
    on: Option<bool>,
}

impl Squeeze {
    pub fn new(period: usize, bb_mult: f64, kc_mult: f64) -> Self {
        Self {
            bb: BBands::new(period, bb_mult),
            kc: Kc::new(period, kc_mult),
            donchian: Donchian::new(period),
            linreg: LinReg::new(period),
            momentum: None,
            on: None,
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.on
    }
}

impl Incremental for Squeeze {
    fn update(&mut self, bar: Ohlcv) {
        self.bb.update(bar);
        self.kc.update(bar);
        self.donchian.update(bar);

        if let (Some(bb_upper), Some(bb_lower), Some(kc_upper), Some(kc_lower)) = (
            self.bb.secondary("upper"),
            self.bb.secondary("lower"),
            self.kc.secondary("upper"),
            self.kc.secondary("lower"),
        ) {
            self.on = Some(bb_lower > kc_lower && bb_upper < kc_upper);
        }

        if let (Some(donchian_mid), Some(sma)) = (self.donchian.value(), self.bb.value()) {
            let avg = (donchian_mid + sma) / 2.0;
            self.linreg.update(Ohlcv {
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close - avg,
                volume: bar.volume,
            });
            self.momentum = self.linreg.value();
        }
    }
    fn reset(&mut self) {
        self.bb.reset();
        self.kc.reset();
        self.donchian.reset();
        self.linreg.reset();
        self.momentum = None;
        self.on = None;
    }
    fn value(&self) -> Option<f64> {
        self.momentum
    }
    fn is_ready(&self) -> bool {
        self.momentum.is_some()
    }
    fn secondary(&self, name: &str) -> Option<f64> {
        match name {
            "on" => self.on.map(|b| if b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// Fisher Transform: normalises price into `(-1, 1)` over a rolling
/// high/low window, then applies the Fisher recursion. The first ready
/// value is pinned to exactly `0.0` (matches `pandas_ta`), not computed
/// from the smoothing recursion.
#[derive(Debug, Clone)]
pub struct Fisher {
    period: usize,
    donchian: Donchian,
    prev_normalized: f64,
    prev_fisher: f64,
    value: Option<f64>,
}

impl Fisher {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            donchian: Donchian::new(period),
            prev_normalized: 0.0,
            prev_fisher: 0.0,
            value: None,
        }
    }
}

impl Incremental for Fisher {
    fn update(&mut self, bar: Ohlcv) {
        self.donchian.update(bar);
        let (Some(hh), Some(ll)) = (self.donchian.secondary("upper"), self.donchian.secondary("lower")) else {
            return;
        };
        let hl2 = (bar.high + bar.low) / 2.0;
        let raw = if hh == ll { 0.0 } else { 2.0 * ((hl2 - ll) / (hh - ll) - 0.5) };
        let normalized = (0.66 * raw.clamp(-0.999, 0.999) + 0.67 * self.prev_normalized).clamp(-0.999, 0.999);

        if self.value.is_none() {
            self.value = Some(0.0);
        } else {
            let fisher = 0.5 * ((1.0 + normalized) / (1.0 - normalized)).ln() + 0.5 * self.prev_fisher;
            self.value = Some(fisher);
        }
        self.prev_normalized = normalized;
        self.prev_fisher = self.value.unwrap();
    }
    fn reset(&mut self) {
        *self = Fisher::new(self.period);
    }
    fn value(&self) -> Option<f64> {
        self.value
    }
    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}
