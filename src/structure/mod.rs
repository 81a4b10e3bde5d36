//! Structure Detector (C3): swing/trend/zone computation layered over
//! closed OHLCV, ported from `original_source/src/backtest/structure_types.py`.
//!
//! Every detector here only ever looks at bars up to and including the one
//! just passed to `update` — swing confirmation necessarily lags the
//! pivot candidate by `right` bars, which is how "no look-ahead" is
//! satisfied rather than violated.

pub mod swing;
pub mod trend;
pub mod zone;

pub use swing::{PairDirection, SwingDetector, SwingOutput};
pub use trend::{TrendDetector, TrendState};
pub use zone::{Zone, ZoneDetector, ZoneState, ZoneType};

/// Distinguishes the two structure block kinds a Play can declare, per
/// spec.md §4.3's `StructureType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureType {
    Swing,
    Trend,
}
