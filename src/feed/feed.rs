//! Feed Store (C1) — ordered, append-only OHLCV + indicator/structure arrays
//! for one `(symbol, timeframe)` pair.

use std::collections::HashMap;

use crate::domain::{Bar, Timeframe};
use crate::feed::error::FeedError;

/// A read-only view of one bar plus its registered feature values, returned
/// by [`Feed::at`].
#[derive(Debug, Clone, Copy)]
pub struct BarView<'a> {
    pub bar: &'a Bar,
    pub idx: usize,
}

/// Ordered, append-only store of bars for one `(symbol, timeframe)`.
///
/// Indicator and structure output arrays are keyed strings registered at
/// construction time; every array stays exactly as long as the OHLCV arrays
/// (missing values are `f64::NAN` until a bar is appended and the caller
/// supplies a value for that key).
pub struct Feed {
    symbol: String,
    timeframe: Timeframe,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    ts_open: Vec<i64>,
    ts_close: Vec<i64>,
    indicator_keys: Vec<String>,
    indicators: HashMap<String, Vec<f64>>,
    structure_keys: Vec<String>,
    structures: HashMap<String, Vec<f64>>,
    ts_index: HashMap<i64, usize>,
}

impl Feed {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        indicator_keys: Vec<String>,
        structure_keys: Vec<String>,
    ) -> Self {
        let indicators = indicator_keys
            .iter()
            .map(|k| (k.clone(), Vec::new()))
            .collect();
        let structures = structure_keys
            .iter()
            .map(|k| (k.clone(), Vec::new()))
            .collect();
        Self {
            symbol: symbol.into(),
            timeframe,
            open: Vec::new(),
            high: Vec::new(),
            low: Vec::new(),
            close: Vec::new(),
            volume: Vec::new(),
            ts_open: Vec::new(),
            ts_close: Vec::new(),
            indicator_keys,
            indicators,
            structure_keys,
            structures,
            ts_index: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn length(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Append one closed bar plus its feature values for this index.
    ///
    /// Strictly monotone in `ts_close`; unregistered keys are rejected.
    /// Any registered key absent from `indicator_values`/`structure_values`
    /// for this append is recorded as missing (`NaN`) at this index.
    pub fn append(
        &mut self,
        bar: Bar,
        indicator_values: &HashMap<String, f64>,
        structure_values: &HashMap<String, f64>,
    ) -> Result<usize, FeedError> {
        if let Some(&last_ts) = self.ts_close.last() {
            if bar.ts_close <= last_ts {
                return Err(FeedError::NonMonotonicTimestamp {
                    last_ts,
                    new_ts: bar.ts_close,
                });
            }
        }
        for key in indicator_values.keys() {
            if !self.indicators.contains_key(key) {
                return Err(FeedError::UnregisteredIndicatorKey(key.clone()));
            }
        }
        for key in structure_values.keys() {
            if !self.structures.contains_key(key) {
                return Err(FeedError::UnregisteredStructureKey(key.clone()));
            }
        }

        let idx = self.close.len();
        self.open.push(bar.open);
        self.high.push(bar.high);
        self.low.push(bar.low);
        self.close.push(bar.close);
        self.volume.push(bar.volume);
        self.ts_open.push(bar.ts_open);
        self.ts_close.push(bar.ts_close);

        for key in &self.indicator_keys {
            let v = indicator_values.get(key).copied().unwrap_or(f64::NAN);
            self.indicators.get_mut(key).unwrap().push(v);
        }
        for key in &self.structure_keys {
            let v = structure_values.get(key).copied().unwrap_or(f64::NAN);
            self.structures.get_mut(key).unwrap().push(v);
        }

        self.ts_index.insert(bar.ts_close, idx);
        Ok(idx)
    }

    pub fn at(&self, idx: usize) -> Result<Bar, FeedError> {
        if idx >= self.close.len() {
            return Err(FeedError::IndexOutOfBounds(idx, self.close.len()));
        }
        Ok(Bar {
            ts_open: self.ts_open[idx],
            ts_close: self.ts_close[idx],
            open: self.open[idx],
            high: self.high[idx],
            low: self.low[idx],
            close: self.close[idx],
            volume: self.volume[idx],
        })
    }

    /// Read a field or registered key by name at `idx`. Returns `None` if the
    /// key is unknown or missing (`NaN`) at that index.
    pub fn get(&self, key: &str, idx: usize) -> Option<f64> {
        let value = match key {
            "open" => self.open.get(idx).copied(),
            "high" => self.high.get(idx).copied(),
            "low" => self.low.get(idx).copied(),
            "close" => self.close.get(idx).copied(),
            "volume" => self.volume.get(idx).copied(),
            _ => self
                .indicators
                .get(key)
                .or_else(|| self.structures.get(key))
                .and_then(|v| v.get(idx))
                .copied(),
        }?;
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.indicators.contains_key(key) || self.structures.contains_key(key)
    }

    /// Largest index `i` such that `ts_close[i] <= ts_close_ms`, or `None`
    /// if no such bar exists yet (O(1) amortised via the ts-index; falls
    /// back to a binary search the first time a given timestamp is absent).
    pub fn find_idx_at_or_before(&self, ts_close_ms: i64) -> Option<usize> {
        if let Some(&idx) = self.ts_index.get(&ts_close_ms) {
            return Some(idx);
        }
        // Binary search over the strictly ascending ts_close array.
        match self.ts_close.binary_search(&ts_close_ms) {
            Ok(idx) => Some(idx),
            Err(0) => None,
            Err(pos) => Some(pos - 1),
        }
    }

    pub fn ts_close_at(&self, idx: usize) -> Option<i64> {
        self.ts_close.get(idx).copied()
    }

    pub fn last_ts_close(&self) -> Option<i64> {
        self.ts_close.last().copied()
    }

    pub fn closes(&self) -> &[f64] {
        &self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts_close: i64, close: f64) -> Bar {
        Bar {
            ts_open: ts_close - 60_000,
            ts_close,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn append_rejects_non_monotonic_timestamp() {
        let mut feed = Feed::new("BTCUSDT", Timeframe::M1, vec![], vec![]);
        feed.append(bar(1000, 1.0), &HashMap::new(), &HashMap::new())
            .unwrap();
        let err = feed
            .append(bar(1000, 2.0), &HashMap::new(), &HashMap::new())
            .unwrap_err();
        assert_eq!(
            err,
            FeedError::NonMonotonicTimestamp {
                last_ts: 1000,
                new_ts: 1000
            }
        );
    }

    #[test]
    fn append_rejects_unregistered_key() {
        let mut feed = Feed::new("BTCUSDT", Timeframe::M1, vec![], vec![]);
        let mut ind = HashMap::new();
        ind.insert("rsi_14".to_string(), 55.0);
        let err = feed.append(bar(1000, 1.0), &ind, &HashMap::new()).unwrap_err();
        assert_eq!(err, FeedError::UnregisteredIndicatorKey("rsi_14".into()));
    }

    #[test]
    fn find_idx_at_or_before_o1_lookup() {
        let mut feed = Feed::new("BTCUSDT", Timeframe::M1, vec![], vec![]);
        for i in 0..5 {
            feed.append(bar(1000 + i * 60_000, i as f64), &HashMap::new(), &HashMap::new())
                .unwrap();
        }
        assert_eq!(feed.find_idx_at_or_before(1000), Some(0));
        assert_eq!(feed.find_idx_at_or_before(1000 + 2 * 60_000), Some(2));
        assert_eq!(feed.find_idx_at_or_before(1000 + 2 * 60_000 + 10), Some(2));
        assert_eq!(feed.find_idx_at_or_before(999), None);
    }

    #[test]
    fn missing_value_is_nan_sentinel_until_written() {
        let mut feed = Feed::new(
            "BTCUSDT",
            Timeframe::M1,
            vec!["ema_20".to_string()],
            vec![],
        );
        feed.append(bar(1000, 1.0), &HashMap::new(), &HashMap::new())
            .unwrap();
        assert_eq!(feed.get("ema_20", 0), None);
    }

    #[test]
    fn arrays_stay_aligned_with_ohlcv_length() {
        let mut feed = Feed::new(
            "BTCUSDT",
            Timeframe::M1,
            vec!["ema_20".to_string()],
            vec![],
        );
        for i in 0..3 {
            let mut ind = HashMap::new();
            if i >= 1 {
                ind.insert("ema_20".to_string(), i as f64);
            }
            feed.append(bar(1000 + i * 60_000, i as f64), &ind, &HashMap::new())
                .unwrap();
        }
        assert_eq!(feed.length(), 3);
        assert_eq!(feed.get("ema_20", 0), None);
        assert_eq!(feed.get("ema_20", 1), Some(1.0));
    }
}
