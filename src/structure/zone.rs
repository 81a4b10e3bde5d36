//! Supply/demand zones: optional children of a swing block. A zone is
//! created from a confirmed pivot and its confirming bar's range, stays
//! `Active` until price closes through its far bound, at which point it
//! is permanently `Broken`.

use crate::indicators::Ohlcv;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneType {
    Demand,
    Supply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneState {
    #[default]
    None,
    Active,
    Broken,
}

impl ZoneState {
    /// Code written into the feed as `f64`; matches
    /// `play::play::zone_state_label`'s declaration order.
    pub fn as_code(self) -> i64 {
        match self {
            ZoneState::None => 0,
            ZoneState::Active => 1,
            ZoneState::Broken => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Zone {
    pub zone_type: ZoneType,
    pub lower: f64,
    pub upper: f64,
    pub state: ZoneState,
}

impl Zone {
    fn breaks_on(&self, close: f64) -> bool {
        match self.zone_type {
            ZoneType::Demand => close < self.lower,
            ZoneType::Supply => close > self.upper,
        }
    }
}

/// Tracks the zones spawned from a single swing block's confirmed pivots.
/// Exposes the most recently created zone of each type as the detector's
/// field output (`structure.<key>.zones.<zone_key>.<field>` in the rule
/// namespace resolves to whichever zone the Play names).
#[derive(Debug, Clone, Default)]
pub struct ZoneDetector {
    zones: Vec<Zone>,
}

impl ZoneDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn latest(&self, zone_type: ZoneType) -> Option<&Zone> {
        self.zones.iter().rev().find(|z| z.zone_type == zone_type && z.state != ZoneState::Broken)
    }

    pub fn on_swing_low(&mut self, level: f64, confirming_bar: Ohlcv) {
        let margin = (confirming_bar.high - confirming_bar.low).max(0.0);
        self.zones.push(Zone {
            zone_type: ZoneType::Demand,
            lower: level,
            upper: level + margin,
            state: ZoneState::Active,
        });
    }

    pub fn on_swing_high(&mut self, level: f64, confirming_bar: Ohlcv) {
        let margin = (confirming_bar.high - confirming_bar.low).max(0.0);
        self.zones.push(Zone {
            zone_type: ZoneType::Supply,
            lower: level - margin,
            upper: level,
            state: ZoneState::Active,
        });
    }

    /// Called once per bar with the bar's close; marks any active zone
    /// whose far bound has been closed through as permanently `Broken`.
    pub fn update(&mut self, bar: Ohlcv) {
        for zone in self.zones.iter_mut() {
            if zone.state == ZoneState::Active && zone.breaks_on(bar.close) {
                zone.state = ZoneState::Broken;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(c: f64) -> Ohlcv {
        Ohlcv { open: c, high: c + 1.0, low: c - 1.0, close: c, volume: 1.0 }
    }

    #[test]
    fn demand_zone_breaks_on_close_below_lower() {
        let mut z = ZoneDetector::new();
        z.on_swing_low(100.0, bar(100.0));
        assert_eq!(z.latest(ZoneType::Demand).unwrap().state, ZoneState::Active);
        z.update(bar(95.0));
        assert!(z.latest(ZoneType::Demand).is_none());
    }

    #[test]
    fn supply_zone_stays_active_while_price_stays_below_upper() {
        let mut z = ZoneDetector::new();
        z.on_swing_high(200.0, bar(200.0));
        z.update(bar(190.0));
        assert_eq!(z.latest(ZoneType::Supply).unwrap().state, ZoneState::Active);
    }
}
