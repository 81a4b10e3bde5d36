//! Error types for the feed store (C1).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error(
        "non-monotonic timestamp: new bar ts_close={new_ts} is not strictly greater than \
         last bar ts_close={last_ts}"
    )]
    NonMonotonicTimestamp { last_ts: i64, new_ts: i64 },

    #[error("unregistered indicator key '{0}' — register it at feed construction before writing")]
    UnregisteredIndicatorKey(String),

    #[error("unregistered structure key '{0}' — register it at feed construction before writing")]
    UnregisteredStructureKey(String),

    #[error("bar index {0} out of bounds (feed has {1} bars)")]
    IndexOutOfBounds(usize, usize),

    #[error("gap in bar grid: expected next ts_close > {expected_after}, got {got} for timeframe {tf_minutes}m bars")]
    GapInGrid { expected_after: i64, got: i64, tf_minutes: i64 },
}
