//! Bar — the fundamental market data unit, and the canonical timeframe set.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical intraday-to-daily timeframe. `D` is the only calendar-day
/// member; everything else is a fixed number of minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H12,
    D,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeframeError {
    #[error(
        "Timeframe '{given}' is a Bybit API interval, not canonical. Use '{suggestion}' instead. \
         Canonical timeframes: 1m, 3m, 5m, 15m, 30m, 1h, 2h, 4h, 6h, 12h, D"
    )]
    BybitInterval { given: String, suggestion: String },

    #[error(
        "Invalid timeframe: '{0}'. Must be one of: 1m, 3m, 5m, 15m, 30m, 1h, 2h, 4h, 6h, 12h, D"
    )]
    Invalid(String),
}

impl Timeframe {
    /// Parses a canonical timeframe string, case-insensitively, except that
    /// `"D"` is the only accepted spelling for the daily timeframe — ported
    /// from the original's `validate_canonical_tf`, which checks the
    /// original-case string before lower-casing (`"d"` does not match the
    /// canonical set on its own, but is accepted as a common alias for `"D"`).
    pub fn parse(tf: &str) -> Result<Self, TimeframeError> {
        let trimmed = tf.trim();
        if let Some(parsed) = Self::from_canonical(trimmed) {
            return Ok(parsed);
        }
        let lower = trimmed.to_lowercase();
        if let Some(parsed) = Self::from_canonical(&lower) {
            return Ok(parsed);
        }
        if lower == "d" {
            return Ok(Timeframe::D);
        }
        if let Some(suggestion) = Self::from_bybit_interval(trimmed) {
            return Err(TimeframeError::BybitInterval {
                given: trimmed.to_string(),
                suggestion: suggestion.canonical_str().to_string(),
            });
        }
        Err(TimeframeError::Invalid(trimmed.to_string()))
    }

    fn from_canonical(s: &str) -> Option<Self> {
        Some(match s {
            "1m" => Timeframe::M1,
            "3m" => Timeframe::M3,
            "5m" => Timeframe::M5,
            "15m" => Timeframe::M15,
            "30m" => Timeframe::M30,
            "1h" => Timeframe::H1,
            "2h" => Timeframe::H2,
            "4h" => Timeframe::H4,
            "6h" => Timeframe::H6,
            "12h" => Timeframe::H12,
            "D" => Timeframe::D,
            _ => return None,
        })
    }

    fn from_bybit_interval(s: &str) -> Option<Self> {
        Some(match s {
            "1" => Timeframe::M1,
            "3" => Timeframe::M3,
            "5" => Timeframe::M5,
            "15" => Timeframe::M15,
            "30" => Timeframe::M30,
            "60" => Timeframe::H1,
            "120" => Timeframe::H2,
            "240" => Timeframe::H4,
            "360" => Timeframe::H6,
            "720" => Timeframe::H12,
            "D" => Timeframe::D,
            _ => return None,
        })
    }

    pub fn canonical_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H12 => "12h",
            Timeframe::D => "D",
        }
    }

    /// Minutes per bar. `D` is treated as a fixed 1440 minutes for the
    /// purpose of window-operator offset scaling (`anchor_tf_minutes /
    /// exec_tf_minutes`); calendar daylight-saving drift is out of scope.
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H2 => 120,
            Timeframe::H4 => 240,
            Timeframe::H6 => 360,
            Timeframe::H12 => 720,
            Timeframe::D => 1440,
        }
    }
}

/// Immutable OHLCV bar with millisecond-epoch, half-open bar bounds:
/// `ts_open` is inclusive, `ts_close` is exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub ts_open: i64,
    pub ts_close: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// True if any OHLCV field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .any(|v| !v.is_finite())
    }

    /// Basic OHLCV sanity check: high is the max, low is the min, prices positive.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }

    pub fn true_range(&self, prev_close: f64) -> f64 {
        let a = self.high - self.low;
        let b = (self.high - prev_close).abs();
        let c = (self.low - prev_close).abs();
        a.max(b).max(c)
    }

    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn hlc3(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn ohlc4(&self) -> f64 {
        (self.open + self.high + self.low + self.close) / 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar {
            ts_open: 1_700_000_000_000,
            ts_close: 1_700_000_060_000,
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0; // below low
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = sample_bar();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar.ts_close, deser.ts_close);
        assert_eq!(bar.close, deser.close);
    }

    #[test]
    fn timeframe_parses_canonical_and_aliases() {
        assert_eq!(Timeframe::parse("1h").unwrap(), Timeframe::H1);
        assert_eq!(Timeframe::parse("1H").unwrap(), Timeframe::H1);
        assert_eq!(Timeframe::parse("d").unwrap(), Timeframe::D);
        assert_eq!(Timeframe::parse("D").unwrap(), Timeframe::D);
    }

    #[test]
    fn timeframe_rejects_bybit_numeric_interval() {
        let err = Timeframe::parse("60").unwrap_err();
        assert!(matches!(err, TimeframeError::BybitInterval { .. }));
    }

    #[test]
    fn timeframe_rejects_garbage() {
        assert!(matches!(
            Timeframe::parse("banana"),
            Err(TimeframeError::Invalid(_))
        ));
    }

    #[test]
    fn timeframe_minutes_scale() {
        assert_eq!(Timeframe::M15.minutes(), 15);
        assert_eq!(Timeframe::D.minutes(), 1440);
    }
}
