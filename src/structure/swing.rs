//! Swing pivot detection: confirmed high/low pivots via a fixed left/right
//! lookback window, plus the version counters and pair-completion events
//! that downstream consumers (Anchored VWAP, the trend detector) key off.

use crate::indicators::Ohlcv;
use std::collections::VecDeque;

/// Direction of a just-completed high/low swing pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairDirection {
    Bullish,
    Bearish,
}

impl PairDirection {
    /// Code written into the feed as `f64`. Matches the label order
    /// `play::play::declare_structure_enum_types` declares for
    /// `<block>.pair_direction` (`bearish` = 0, `bullish` = 1) — the feed
    /// encoding is independent of this enum's declaration order above.
    pub fn as_code(self) -> i64 {
        match self {
            PairDirection::Bearish => 0,
            PairDirection::Bullish => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PivotKind {
    High,
    Low,
}

/// Per-bar output held by a `SwingDetector`: the latest confirmed levels
/// and the monotone version counters other components watch for change.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwingOutput {
    pub high_level: Option<f64>,
    pub low_level: Option<f64>,
    pub high_version: u64,
    pub low_version: u64,
    pub pair_version: u64,
    pub pair_direction: Option<PairDirection>,
}

/// Confirms a pivot at `window[left]` once `right` additional bars have
/// arrived, by requiring the candidate's high (low) to be the window's
/// max (min). Candidates of the same kind replace an unpaired pending
/// pivot rather than completing a pair (only alternating high/low pivots
/// pair); a kind switch increments `pair_version`.
#[derive(Debug, Clone)]
pub struct SwingDetector {
    left: usize,
    right: usize,
    window: VecDeque<Ohlcv>,
    last_pivot: Option<(PivotKind, f64)>,
    out: SwingOutput,
}

impl SwingDetector {
    pub fn new(left: usize, right: usize) -> Self {
        Self {
            left,
            right,
            window: VecDeque::with_capacity(left + right + 1),
            last_pivot: None,
            out: SwingOutput::default(),
        }
    }

    pub fn output(&self) -> SwingOutput {
        self.out
    }

    pub fn update(&mut self, bar: Ohlcv) {
        self.window.push_back(bar);
        let capacity = self.left + self.right + 1;
        if self.window.len() > capacity {
            self.window.pop_front();
        }
        if self.window.len() < capacity {
            return;
        }

        let candidate = self.window[self.left];
        let is_high = self.window.iter().all(|b| candidate.high >= b.high);
        let is_low = self.window.iter().all(|b| candidate.low <= b.low);

        if is_high {
            self.confirm(PivotKind::High, candidate.high);
        }
        if is_low {
            self.confirm(PivotKind::Low, candidate.low);
        }
    }

    fn confirm(&mut self, kind: PivotKind, level: f64) {
        match kind {
            PivotKind::High => {
                self.out.high_level = Some(level);
                self.out.high_version += 1;
            }
            PivotKind::Low => {
                self.out.low_level = Some(level);
                self.out.low_version += 1;
            }
        }
        match self.last_pivot {
            None => self.last_pivot = Some((kind, level)),
            Some((last_kind, _)) if last_kind == kind => {
                self.last_pivot = Some((kind, level));
            }
            Some((last_kind, _)) => {
                self.out.pair_version += 1;
                self.out.pair_direction = Some(match (last_kind, kind) {
                    (PivotKind::Low, PivotKind::High) => PairDirection::Bullish,
                    (PivotKind::High, PivotKind::Low) => PairDirection::Bearish,
                    _ => unreachable!(),
                });
                self.last_pivot = Some((kind, level));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(h: f64, l: f64) -> Ohlcv {
        Ohlcv { open: (h + l) / 2.0, high: h, low: l, close: (h + l) / 2.0, volume: 1.0 }
    }

    #[test]
    fn confirms_a_swing_high_at_window_center() {
        let mut sw = SwingDetector::new(1, 1);
        // candidate bar is the middle: low, HIGH, low -> confirms once the
        // third bar (right=1) arrives.
        sw.update(bar(10.0, 8.0));
        sw.update(bar(15.0, 12.0));
        assert_eq!(sw.output().high_version, 0); // not yet confirmed, window not full
        sw.update(bar(11.0, 9.0));
        assert_eq!(sw.output().high_version, 1);
        assert_eq!(sw.output().high_level, Some(15.0));
    }

    #[test]
    fn alternating_high_low_completes_a_pair() {
        let mut sw = SwingDetector::new(1, 1);
        // Low pivot first...
        sw.update(bar(10.0, 10.0));
        sw.update(bar(9.0, 5.0));
        sw.update(bar(10.0, 9.0));
        assert_eq!(sw.output().low_version, 1);
        assert_eq!(sw.output().pair_version, 0);
        // ...then a high pivot completes the pair.
        sw.update(bar(20.0, 15.0));
        sw.update(bar(10.0, 9.0));
        assert_eq!(sw.output().high_version, 1);
        assert_eq!(sw.output().pair_version, 1);
        assert_eq!(sw.output().pair_direction, Some(PairDirection::Bullish));
    }

    #[test]
    fn same_kind_pivot_replaces_pending_without_pairing() {
        let mut sw = SwingDetector::new(1, 1);
        sw.update(bar(10.0, 9.0));
        sw.update(bar(20.0, 15.0));
        sw.update(bar(10.0, 9.0));
        assert_eq!(sw.output().high_version, 1);
        sw.update(bar(25.0, 18.0));
        sw.update(bar(10.0, 9.0));
        assert_eq!(sw.output().high_version, 2);
        assert_eq!(sw.output().pair_version, 0);
    }
}
