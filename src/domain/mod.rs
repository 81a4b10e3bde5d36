//! Domain primitives: the `Bar`/`Timeframe` market-data unit and the
//! deterministic identity types (`ConfigHash`, `FullHash`, `RunId`, …)
//! that flow through the rest of the crate.

pub mod bar;
pub mod ids;

pub use bar::{Bar, Timeframe, TimeframeError};
pub use ids::{ConfigHash, DatasetHash, FullHash, IdGen, OcoGroupId, OrderId, RunId, SignalEventId};
