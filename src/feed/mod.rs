//! Feed Store (C1): ordered, append-only OHLCV + indicator/structure arrays
//! per `(symbol, timeframe)`, plus `MultiFeed` forward-fill coordination
//! across exec/med/high timeframe roles.

pub mod error;
#[allow(clippy::module_inception)]
pub mod feed;
pub mod multi_feed;

pub use error::FeedError;
pub use feed::{BarView, Feed};
pub use multi_feed::{MultiFeed, TfRole};
