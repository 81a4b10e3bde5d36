//! Incremental/batch parity contract: an indicator's incremental output at
//! bar `i` must equal the same formula computed in one batch pass over
//! `closes[0..=i]`, within `1e-6` absolute tolerance once warmup
//! completes. Exercised here with `proptest` over random close series
//! rather than a handful of fixed examples, since the contract is
//! supposed to hold for every input, not just the worked ones in
//! `core.rs`'s own `#[cfg(test)]` module.

use proptest::prelude::*;
use trendlab_core::indicators::core::{Ema, Rsi, Sma};
use trendlab_core::indicators::{Incremental, Ohlcv};

const TOLERANCE: f64 = 1e-6;

fn ohlcv(close: f64) -> Ohlcv {
    Ohlcv { open: close, high: close + 1.0, low: close - 1.0, close, volume: 1_000.0 }
}

/// Plain sliding-window mean, recomputed from scratch at every index —
/// the batch reference for `Sma`.
fn batch_sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                let window = &closes[i + 1 - period..=i];
                Some(window.iter().sum::<f64>() / period as f64)
            }
        })
        .collect()
}

/// SMA-seeded recursive EMA, matching `Ema::update_value`'s warmup
/// exactly: the first `period` closes seed an SMA, then every later
/// close blends in via `alpha * v + (1 - alpha) * prev`.
fn batch_ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(closes.len());
    let mut prev: Option<f64> = None;
    for (i, &c) in closes.iter().enumerate() {
        prev = match prev {
            None if i + 1 >= period => Some(closes[i + 1 - period..=i].iter().sum::<f64>() / period as f64),
            None => None,
            Some(p) => Some(alpha * c + (1.0 - alpha) * p),
        };
        out.push(prev);
    }
    out
}

/// Wilder-smoothed RSI, matching `Rsi::update`'s seed-then-blend
/// structure and its 0/0 tie-breaking in `value()`.
fn batch_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    for w in closes.windows(2) {
        let change = w[1] - w[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut out = vec![None];
    let mut avg: Option<(f64, f64)> = None;
    let alpha = 1.0 / period as f64;
    for i in 0..gains.len() {
        avg = match avg {
            None if i + 1 >= period => {
                let ag = gains[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
                let al = losses[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
                Some((ag, al))
            }
            None => None,
            Some((ag, al)) => Some((alpha * gains[i] + (1.0 - alpha) * ag, alpha * losses[i] + (1.0 - alpha) * al)),
        };
        out.push(avg.map(|(ag, al)| {
            if ag == 0.0 && al == 0.0 {
                50.0
            } else if al == 0.0 {
                100.0
            } else if ag == 0.0 {
                0.0
            } else {
                100.0 - 100.0 / (1.0 + ag / al)
            }
        }));
    }
    out
}

fn assert_matches_batch(incremental: &[Option<f64>], batch: &[Option<f64>]) {
    assert_eq!(incremental.len(), batch.len());
    for (i, (inc, bat)) in incremental.iter().zip(batch.iter()).enumerate() {
        match (inc, bat) {
            (None, None) => {}
            (Some(a), Some(b)) => assert!((a - b).abs() < TOLERANCE, "index {i}: incremental {a} vs batch {b}"),
            (a, b) => panic!("index {i}: readiness mismatch, incremental={a:?} batch={b:?}"),
        }
    }
}

proptest! {
    #[test]
    fn ema_incremental_matches_batch(closes in prop::collection::vec(1.0f64..500.0, 25..120), period in 2usize..20) {
        let mut ema = Ema::new(period);
        let incremental: Vec<Option<f64>> = closes.iter().map(|&c| { ema.update(ohlcv(c)); ema.value() }).collect();
        assert_matches_batch(&incremental, &batch_ema(&closes, period));
    }

    #[test]
    fn sma_incremental_matches_batch(closes in prop::collection::vec(1.0f64..500.0, 25..120), period in 2usize..20) {
        let mut sma = Sma::new(period);
        let incremental: Vec<Option<f64>> = closes.iter().map(|&c| { sma.update(ohlcv(c)); sma.value() }).collect();
        assert_matches_batch(&incremental, &batch_sma(&closes, period));
    }

    #[test]
    fn rsi_incremental_matches_batch(closes in prop::collection::vec(1.0f64..500.0, 25..120), period in 2usize..20) {
        let mut rsi = Rsi::new(period);
        let incremental: Vec<Option<f64>> = closes.iter().map(|&c| { rsi.update(ohlcv(c)); rsi.value() }).collect();
        assert_matches_batch(&incremental, &batch_rsi(&closes, period));
    }
}
