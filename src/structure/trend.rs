//! Structural trend classification from confirmed swing pivots: HH/HL
//! pairs classify `up`, LL/LH pairs classify `down`, anything else (or
//! insufficient history) stays `unknown`.
//!
//! This is *structural* trend, derived purely from pivot levels — not a
//! sentiment/regime signal. A future regime layer may reuse the name but
//! must not be confused with this one (SPEC_FULL.md §4.3).

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendState {
    #[default]
    Unknown,
    Up,
    Down,
}

impl TrendState {
    /// Code written into the feed as `f64`; matches
    /// `play::play::trend_state_label`'s declaration order.
    pub fn as_code(self) -> i64 {
        match self {
            TrendState::Unknown => 0,
            TrendState::Up => 1,
            TrendState::Down => 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrendDetector {
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    state: TrendState,
}

impl TrendDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TrendState {
        self.state
    }

    pub fn on_swing_high(&mut self, level: f64) {
        self.highs.push_back(level);
        if self.highs.len() > 2 {
            self.highs.pop_front();
        }
        self.recompute();
    }

    pub fn on_swing_low(&mut self, level: f64) {
        self.lows.push_back(level);
        if self.lows.len() > 2 {
            self.lows.pop_front();
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        if self.highs.len() < 2 || self.lows.len() < 2 {
            self.state = TrendState::Unknown;
            return;
        }
        let (h0, h1) = (self.highs[0], self.highs[1]);
        let (l0, l1) = (self.lows[0], self.lows[1]);
        self.state = if h1 > h0 && l1 > l0 {
            TrendState::Up
        } else if h1 < h0 && l1 < l0 {
            TrendState::Down
        } else {
            TrendState::Unknown
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_highs_and_higher_lows_classify_up() {
        let mut t = TrendDetector::new();
        t.on_swing_low(100.0);
        t.on_swing_high(110.0);
        t.on_swing_low(105.0);
        t.on_swing_high(120.0);
        assert_eq!(t.state(), TrendState::Up);
    }

    #[test]
    fn lower_lows_and_lower_highs_classify_down() {
        let mut t = TrendDetector::new();
        t.on_swing_high(120.0);
        t.on_swing_low(105.0);
        t.on_swing_high(110.0);
        t.on_swing_low(95.0);
        assert_eq!(t.state(), TrendState::Down);
    }

    #[test]
    fn mixed_pivots_stay_unknown() {
        let mut t = TrendDetector::new();
        t.on_swing_low(100.0);
        t.on_swing_high(110.0);
        t.on_swing_low(102.0);
        t.on_swing_high(108.0);
        assert_eq!(t.state(), TrendState::Unknown);
    }
}
