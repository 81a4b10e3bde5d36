//! Snapshot forward-fill plumbing (invariant 4): `Snapshot::get` on a
//! companion timeframe must return exactly the value a direct array read
//! on that feed, at the forward-filled index, would return — at offsets
//! {0, 1, 2, 5} and across exec/med/high timeframe-boundary crossings.

use std::collections::HashMap;

use trendlab_core::domain::{Bar, Timeframe};
use trendlab_core::feed::{Feed, MultiFeed, TfRole};
use trendlab_core::snapshot::{MarkPriceSource, Snapshot, TypeRegistry};

fn exec_bar(i: i64, close: f64) -> Bar {
    let ts_close = (i + 1) * 60_000;
    Bar { ts_open: ts_close - 60_000, ts_close, open: close, high: close + 0.5, low: close - 0.5, close, volume: 1.0 }
}

fn med_bar(i: i64, close: f64) -> Bar {
    let ts_close = (i + 1) * 15 * 60_000;
    Bar { ts_open: ts_close - 15 * 60_000, ts_close, open: close, high: close + 1.0, low: close - 1.0, close, volume: 10.0 }
}

fn high_bar(i: i64, close: f64) -> Bar {
    let ts_close = (i + 1) * 60 * 60_000;
    Bar { ts_open: ts_close - 60 * 60_000, ts_close, open: close, high: close + 2.0, low: close - 2.0, close, volume: 100.0 }
}

/// Builds 120 exec (1m) bars, 8 med (15m) bars, and 2 high (1h) bars, each
/// registering an `"ema"` key whose value is just the bar's index — makes
/// it trivial to assert which bar a forward-filled read landed on.
fn build_feeds() -> MultiFeed {
    let mut exec = Feed::new("BTCUSDT", Timeframe::M1, vec!["ema".to_string()], vec![]);
    for i in 0..120i64 {
        let mut v = HashMap::new();
        v.insert("ema".to_string(), i as f64);
        exec.append(exec_bar(i, 100.0 + i as f64), &v, &HashMap::new()).unwrap();
    }

    let mut med = Feed::new("BTCUSDT", Timeframe::M15, vec!["ema".to_string()], vec![]);
    for i in 0..8i64 {
        let mut v = HashMap::new();
        v.insert("ema".to_string(), (i * 100) as f64);
        med.append(med_bar(i, 100.0), &v, &HashMap::new()).unwrap();
    }

    let mut high = Feed::new("BTCUSDT", Timeframe::H1, vec!["ema".to_string()], vec![]);
    for i in 0..2i64 {
        let mut v = HashMap::new();
        v.insert("ema".to_string(), (i * 1_000) as f64);
        high.append(high_bar(i, 100.0), &v, &HashMap::new()).unwrap();
    }

    MultiFeed::new(exec, Some(med), Some(high))
}

#[test]
fn exec_role_reads_match_direct_array_reads_at_every_offset() {
    let feeds = build_feeds();
    let types = TypeRegistry::new();
    let exec_idx = 50;
    let snapshot = Snapshot::new(&feeds, exec_idx, 100.0, MarkPriceSource::LastClose, &types);

    for offset in [0usize, 1, 2, 5] {
        let expected = feeds.feed_for(TfRole::Exec).unwrap().get("ema", exec_idx - offset);
        assert_eq!(snapshot.get("ema", TfRole::Exec, offset), expected);
    }
}

#[test]
fn med_tf_reads_match_the_forward_filled_index_not_the_exec_index() {
    let feeds = build_feeds();
    let types = TypeRegistry::new();

    // Exec bar 44 closes at ts 45*60_000 = 2_700_000ms; med bar 2 closes at
    // 3*15*60_000 = 2_700_000ms exactly, med bar 1 at 1_800_000ms. The
    // forward-filled med index for exec_idx=44 is therefore 2 (med bar
    // "2700000 <= 2700000").
    let exec_idx = 44;
    let snapshot = Snapshot::new(&feeds, exec_idx, 100.0, MarkPriceSource::LastClose, &types);
    let med_idx = feeds.forward_fill_idx(TfRole::MedTf, exec_idx).unwrap();

    for offset in [0usize, 1, 2, 5] {
        let expected = feeds.feed_for(TfRole::MedTf).unwrap().get("ema", med_idx.saturating_sub(offset)).filter(|_| med_idx >= offset);
        let expected = if med_idx >= offset { expected } else { None };
        assert_eq!(snapshot.get("ema", TfRole::MedTf, offset), expected);
    }
}

#[test]
fn high_tf_reads_match_the_forward_filled_index_across_the_boundary() {
    let feeds = build_feeds();
    let types = TypeRegistry::new();

    // High bar 0 closes at 3_600_000ms (exec idx 59); high bar 1 closes at
    // 7_200_000ms (exec idx 119). An exec tick one bar before the second
    // high bar closes must still forward-fill to high bar 0.
    let snapshot_before = Snapshot::new(&feeds, 118, 100.0, MarkPriceSource::LastClose, &types);
    assert_eq!(snapshot_before.get("ema", TfRole::HighTf, 0), Some(0.0));

    let snapshot_at_close = Snapshot::new(&feeds, 119, 100.0, MarkPriceSource::LastClose, &types);
    assert_eq!(snapshot_at_close.get("ema", TfRole::HighTf, 0), Some(1_000.0));
}

#[test]
fn offset_running_before_bar_zero_is_missing_not_a_panic() {
    let feeds = build_feeds();
    let types = TypeRegistry::new();
    let snapshot = Snapshot::new(&feeds, 1, 100.0, MarkPriceSource::LastClose, &types);

    assert_eq!(snapshot.get("ema", TfRole::Exec, 5), None);
}

#[test]
fn ts_close_always_reflects_the_exec_feed_regardless_of_companion_timeframes() {
    let feeds = build_feeds();
    let types = TypeRegistry::new();
    let snapshot = Snapshot::new(&feeds, 10, 100.0, MarkPriceSource::LastClose, &types);
    assert_eq!(snapshot.ts_close(), feeds.feed_for(TfRole::Exec).unwrap().ts_close_at(10).unwrap());
}
