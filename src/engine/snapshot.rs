//! Immutable per-cycle measurement record and its derived quantities.

use crate::config::ControlParams;
use chrono::NaiveTime;
use serde::Serialize;

/// Charger connector state as reported by the wallbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorState {
    /// Nothing plugged in
    Idle,
    /// Vehicle connected (waiting or charging)
    Active,
    #[default]
    Other,
}

impl ConnectorState {
    pub fn from_state(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "idle" => ConnectorState::Idle,
            "active" | "charging" | "connected" | "waiting" => ConnectorState::Active,
            _ => ConnectorState::Other,
        }
    }
}

/// Raw readings taken once at the start of a cycle
#[derive(Debug, Clone, Serialize)]
pub struct Measurements {
    pub voltage: f64,
    pub connector: ConnectorState,
    /// Unix seconds of the last RFID tag use
    pub last_tag_timestamp: Option<f64>,
    /// Unix seconds at cycle start
    pub now_timestamp: f64,
    pub force_charge: bool,
    pub pv_primary_1: f64,
    pub pv_primary_2: f64,
    pub pv_secondary: f64,
    pub pv_losses: f64,
    /// Positive while the battery discharges
    pub battery_power: f64,
    pub battery_max_discharge: f64,
    pub battery_soc: f64,
    pub soc_floor: f64,
    pub soc_priority: f64,
    pub house_power: f64,
    pub house_current: f64,
    pub house_max_current: f64,
    pub wallbox_power: f64,
    pub ev_soc: Option<f64>,
    pub ev_target_soc: f64,
    /// 0 disables the emergency mode
    pub ev_emergency_soc: f64,
    pub time_of_day: NaiveTime,
    pub pause_start: NaiveTime,
    pub pause_end: NaiveTime,
    pub sun_elevation: f64,
    pub sun_rising: bool,
    pub elevation_threshold: f64,
    pub min_amps: f64,
    pub max_amps: f64,
    /// Share of the excess above the minimum routed to the battery (%)
    pub battery_priority_ratio: f64,
    pub grid_present: bool,
}

impl Default for Measurements {
    fn default() -> Self {
        Self {
            voltage: 0.0,
            connector: ConnectorState::Other,
            last_tag_timestamp: None,
            now_timestamp: 0.0,
            force_charge: false,
            pv_primary_1: 0.0,
            pv_primary_2: 0.0,
            pv_secondary: 0.0,
            pv_losses: 0.0,
            battery_power: 0.0,
            battery_max_discharge: 0.0,
            battery_soc: 0.0,
            soc_floor: 0.0,
            soc_priority: 0.0,
            house_power: 0.0,
            house_current: 0.0,
            house_max_current: 0.0,
            wallbox_power: 0.0,
            ev_soc: None,
            ev_target_soc: 100.0,
            ev_emergency_soc: 0.0,
            time_of_day: NaiveTime::MIN,
            pause_start: NaiveTime::MIN,
            pause_end: NaiveTime::MIN,
            sun_elevation: 0.0,
            sun_rising: false,
            elevation_threshold: 0.0,
            min_amps: 6.0,
            max_amps: 16.0,
            battery_priority_ratio: 0.0,
            grid_present: true,
        }
    }
}

/// Quantities computed once from the measurements
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Derived {
    /// Primary strings plus secondary minus losses, never negative
    pub pv_power: f64,
    pub pv_primary: f64,
    /// House consumption without the wallbox, never negative
    pub domestic_power: f64,
    /// PV power minus domestic consumption, may be negative
    pub pv_excess: f64,
    pub secondary_active: bool,
    /// Rough estimate of what a dormant secondary inverter could deliver
    pub secondary_potential: f64,
    pub min_wallbox_power: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub meas: Measurements,
    pub derived: Derived,
}

impl Snapshot {
    pub fn new(meas: Measurements, params: &ControlParams) -> Self {
        let pv_primary = meas.pv_primary_1 + meas.pv_primary_2;
        let pv_power = (pv_primary + meas.pv_secondary - meas.pv_losses).max(0.0);
        let domestic_power = (meas.house_power - meas.wallbox_power).max(0.0);
        let derived = Derived {
            pv_power,
            pv_primary,
            domestic_power,
            pv_excess: pv_power - domestic_power,
            secondary_active: meas.pv_secondary > params.min_secondary_inverter_power,
            // String 1 of the primary inverter stands in for the secondary array
            secondary_potential: meas.pv_primary_1,
            min_wallbox_power: meas.min_amps * meas.voltage,
        };
        Self { meas, derived }
    }

    /// Vehicle SOC known, threshold configured and SOC under both threshold and cap
    pub fn ev_emergency(&self, params: &ControlParams) -> bool {
        match self.meas.ev_soc {
            Some(soc) => {
                self.meas.ev_emergency_soc > 0.0
                    && soc < self.meas.ev_emergency_soc
                    && soc < params.ev_emergency_soc_cap
            }
            None => false,
        }
    }

    pub fn grid_absent_battery_low(&self) -> bool {
        !self.meas.grid_present && self.meas.battery_soc < self.meas.soc_floor
    }

    /// Inclusive window, wrapping past midnight when start > end; start == end disables it
    pub fn in_pause_window(&self) -> bool {
        let (start, end, now) = (
            self.meas.pause_start,
            self.meas.pause_end,
            self.meas.time_of_day,
        );
        if start < end {
            start <= now && now <= end
        } else if start > end {
            now >= start || now <= end
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn derived_values_are_clamped() {
        let meas = Measurements {
            voltage: 230.0,
            pv_primary_1: 100.0,
            pv_primary_2: 50.0,
            pv_losses: 400.0,
            house_power: 1000.0,
            wallbox_power: 1500.0,
            ..Default::default()
        };
        let snap = Snapshot::new(meas, &ControlParams::default());
        assert_eq!(snap.derived.pv_power, 0.0);
        assert_eq!(snap.derived.domestic_power, 0.0);
        assert_eq!(snap.derived.pv_excess, 0.0);
        assert_eq!(snap.derived.min_wallbox_power, 6.0 * 230.0);
    }

    #[test]
    fn excess_and_secondary_flag() {
        let meas = Measurements {
            voltage: 230.0,
            pv_primary_1: 2000.0,
            pv_primary_2: 1500.0,
            pv_secondary: 150.0,
            pv_losses: 150.0,
            house_power: 2500.0,
            wallbox_power: 1400.0,
            ..Default::default()
        };
        let snap = Snapshot::new(meas, &ControlParams::default());
        assert_eq!(snap.derived.pv_power, 3500.0);
        assert_eq!(snap.derived.domestic_power, 1100.0);
        assert_eq!(snap.derived.pv_excess, 2400.0);
        assert!(snap.derived.secondary_active);
        assert_eq!(snap.derived.secondary_potential, 2000.0);
    }

    #[test]
    fn connector_mapping() {
        assert_eq!(ConnectorState::from_state("idle"), ConnectorState::Idle);
        assert_eq!(ConnectorState::from_state("Charging"), ConnectorState::Active);
        assert_eq!(ConnectorState::from_state("unavailable"), ConnectorState::Other);
    }

    #[test]
    fn ev_emergency_requires_known_soc_and_threshold() {
        let params = ControlParams::default();
        let mut meas = Measurements {
            ev_soc: Some(15.0),
            ev_emergency_soc: 20.0,
            ..Default::default()
        };
        assert!(Snapshot::new(meas.clone(), &params).ev_emergency(&params));

        meas.ev_soc = None;
        assert!(!Snapshot::new(meas.clone(), &params).ev_emergency(&params));

        meas.ev_soc = Some(15.0);
        meas.ev_emergency_soc = 0.0;
        assert!(!Snapshot::new(meas.clone(), &params).ev_emergency(&params));

        // The cap wins even over a threshold of 100
        meas.ev_soc = Some(99.5);
        meas.ev_emergency_soc = 100.0;
        assert!(!Snapshot::new(meas, &params).ev_emergency(&params));
    }

    #[test]
    fn pause_window_variants() {
        let params = ControlParams::default();
        let at = |start, end, now| {
            let meas = Measurements {
                pause_start: start,
                pause_end: end,
                time_of_day: now,
                ..Default::default()
            };
            Snapshot::new(meas, &params).in_pause_window()
        };
        assert!(at(hm(10, 0), hm(12, 0), hm(10, 0)));
        assert!(at(hm(10, 0), hm(12, 0), hm(12, 0)));
        assert!(!at(hm(10, 0), hm(12, 0), hm(12, 1)));
        assert!(at(hm(22, 0), hm(6, 0), hm(23, 30)));
        assert!(at(hm(22, 0), hm(6, 0), hm(5, 59)));
        assert!(!at(hm(22, 0), hm(6, 0), hm(12, 0)));
        assert!(!at(hm(0, 0), hm(0, 0), hm(0, 0)));
    }
}
