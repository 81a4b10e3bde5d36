//! Engine-level errors (spec.md §7): preflight, data, and fatal
//! bar-loop errors. Exec-adapter rejections and evaluation "failures" are
//! not represented here — `OrderResult`/`EvalResult` carry those.

use thiserror::Error;

use crate::feed::FeedError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("bar for {symbol} arrived with ts_close {new_ts} <= last seen {last_ts}")]
    NonMonotonicTimestamp { symbol: String, last_ts: i64, new_ts: i64 },

    #[error("gap in {symbol}'s {timeframe} grid before ts_close {ts_close}")]
    Gap { symbol: String, timeframe: String, ts_close: i64 },

    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Fatal errors raised by `PlayEngine::process_bar`. Per spec.md §7 these
/// halt the engine with context; the operator decides whether to heal
/// data and restart. A failed order submission is never fatal — see
/// `OrderResult`/`EngineAlarm` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("exec adapter call timed out")]
    ExecTimeout,

    #[error("position in {symbol} is unprotected: exit failed {attempts} times in a row")]
    PositionUnprotected { symbol: String, attempts: u32 },

    #[error("no feed registered for timeframe role {0:?}")]
    MissingFeed(crate::feed::TfRole),

    #[error("engine was stopped; no further bars will be processed")]
    Cancelled,
}
