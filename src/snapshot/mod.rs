//! Snapshot View (C4): a short-lived, read-only projection across
//! exec/med/high timeframes, built once per exec-bar close and handed to
//! the rule evaluator. Holds only borrowed feed references — no data is
//! copied, and nothing mutates through it.

use crate::feed::{MultiFeed, TfRole};

/// Declared runtime type of a feature/structure field, consulted by the
/// evaluator to coerce values that are stored as `f64` in the feed but are
/// semantically a narrower type (e.g. SuperTrend's `direction` is `±1`
/// stored as `f64` but declared `int`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    Int,
    Float,
    Bool,
    String,
}

/// Maps a fully-qualified output key (e.g. `"supertrend.direction"`) to
/// its declared type. Built once at Play-compile time; immutable
/// afterwards and shared across every snapshot the engine builds.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: std::collections::HashMap<String, DeclaredType>,
    /// For `DeclaredType::String` keys only: the code (rounded `f64`,
    /// stored as the array index) -> label mapping, e.g. trend state
    /// `0 -> "unknown"`, `1 -> "up"`, `2 -> "down"`.
    enum_labels: std::collections::HashMap<String, Vec<String>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, key: impl Into<String>, ty: DeclaredType) {
        self.types.insert(key.into(), ty);
    }

    /// Declares `key` as `DeclaredType::String` backed by an ordered label
    /// table — the feed stores the label's index as an `f64` code.
    pub fn declare_enum(&mut self, key: impl Into<String>, labels: &[&str]) {
        let key = key.into();
        self.types.insert(key.clone(), DeclaredType::String);
        self.enum_labels.insert(key, labels.iter().map(|s| s.to_string()).collect());
    }

    /// Defaults to `Float` for any key that was never explicitly declared
    /// — every indicator output is an `f64` unless a compiler pass says
    /// otherwise.
    pub fn get(&self, key: &str) -> DeclaredType {
        self.types.get(key).copied().unwrap_or(DeclaredType::Float)
    }

    pub fn enum_label(&self, key: &str, code: i64) -> Option<String> {
        self.enum_labels.get(key)?.get(usize::try_from(code).ok()?).cloned()
    }
}

/// Where the mark price used for PnL/sizing came from — distinct from
/// `price.<source>.close`, which is a plain feature reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPriceSource {
    LastClose,
    Mid,
    IndexPrice,
}

/// Per-bar read-only cross-timeframe projection. Constructed fresh for
/// every exec-bar close (`Play Engine` step 4); never retained across
/// bars.
pub struct Snapshot<'a> {
    feeds: &'a MultiFeed,
    exec_idx: usize,
    med_idx: Option<usize>,
    high_idx: Option<usize>,
    mark_price: f64,
    mark_price_source: MarkPriceSource,
    types: &'a TypeRegistry,
}

impl<'a> Snapshot<'a> {
    pub fn new(
        feeds: &'a MultiFeed,
        exec_idx: usize,
        mark_price: f64,
        mark_price_source: MarkPriceSource,
        types: &'a TypeRegistry,
    ) -> Self {
        let med_idx = feeds.forward_fill_idx(TfRole::MedTf, exec_idx);
        let high_idx = feeds.forward_fill_idx(TfRole::HighTf, exec_idx);
        Self { feeds, exec_idx, med_idx, high_idx, mark_price, mark_price_source, types }
    }

    fn idx_for(&self, role: TfRole) -> Option<usize> {
        match role {
            TfRole::Exec => Some(self.exec_idx),
            TfRole::MedTf => self.med_idx,
            TfRole::HighTf => self.high_idx,
        }
    }

    /// `ctx_idx - offset` in the feed selected by `role`, then a keyed
    /// lookup in that feed's indicator/structure arrays. `None` for both
    /// "no such companion timeframe" and "offset runs before bar 0" —
    /// both are legitimately "missing", not an error.
    pub fn get(&self, feature_id: &str, role: TfRole, offset: usize) -> Option<f64> {
        let ctx_idx = self.idx_for(role)?;
        let idx = ctx_idx.checked_sub(offset)?;
        self.feeds.feed_for(role)?.get(feature_id, idx)
    }

    pub fn get_declared_type(&self, feature_id: &str, field: &str) -> DeclaredType {
        let key = if field.is_empty() { feature_id.to_string() } else { format!("{feature_id}.{field}") };
        self.types.get(&key)
    }

    pub fn enum_label(&self, key: &str, code: i64) -> Option<String> {
        self.types.enum_label(key, code)
    }

    /// Always `exec_feed.ts_close[exec_idx]`, per spec.md §4.4.
    pub fn ts_close(&self) -> i64 {
        self.feeds.feed_for(TfRole::Exec).and_then(|f| f.ts_close_at(self.exec_idx)).unwrap_or(0)
    }

    pub fn mark_price(&self) -> f64 {
        self.mark_price
    }

    pub fn mark_price_source(&self) -> MarkPriceSource {
        self.mark_price_source
    }

    pub fn exec_idx(&self) -> usize {
        self.exec_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::feed::Feed;
    use std::collections::HashMap;

    fn bar(ts_close: i64, close: f64) -> Bar {
        Bar { ts_open: ts_close - 60_000, ts_close, open: close, high: close, low: close, close, volume: 1.0 }
    }

    #[test]
    fn get_reads_through_forward_filled_companion_index() {
        let mut exec = Feed::new("BTCUSDT", crate::domain::Timeframe::M1, vec!["ema".to_string()], vec![]);
        let mut high = Feed::new("BTCUSDT", crate::domain::Timeframe::H1, vec!["ema".to_string()], vec![]);

        let mut ind = HashMap::new();
        ind.insert("ema".to_string(), 10.0);
        high.append(bar(3_600_000, 100.0), &ind, &HashMap::new()).unwrap();

        for i in 1..=5 {
            let mut ind = HashMap::new();
            ind.insert("ema".to_string(), 1.0 + i as f64);
            exec.append(bar(i * 60_000, i as f64), &ind, &HashMap::new()).unwrap();
        }

        let feeds = MultiFeed::new(exec, None, Some(high));
        let types = TypeRegistry::new();
        let snap = Snapshot::new(&feeds, 4, 5.0, MarkPriceSource::LastClose, &types);

        assert_eq!(snap.get("ema", crate::feed::TfRole::Exec, 0), Some(5.0));
        assert_eq!(snap.get("ema", crate::feed::TfRole::HighTf, 0), Some(10.0));
        assert_eq!(snap.get("ema", crate::feed::TfRole::MedTf, 0), None);
    }

    #[test]
    fn declared_type_defaults_to_float() {
        let types = TypeRegistry::new();
        assert_eq!(types.get("supertrend.direction"), DeclaredType::Float);
    }
}
