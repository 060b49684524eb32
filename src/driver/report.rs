//! Status sensor published to Home Assistant once per cycle.

use crate::engine::{Decision, Snapshot};
use serde_json::{Value, json};

pub struct StatusSensor {
    pub state: String,
    pub attributes: Value,
}

pub struct ReportInput<'a> {
    pub snapshot: &'a Snapshot,
    pub decision: &'a Decision,
    pub cycle_id: &'a str,
    pub cycle_duration_ms: u64,
    pub timestamp: &'a str,
}

pub fn state_text(decision: &Decision) -> String {
    if decision.is_unplugged() {
        "Not connected".to_string()
    } else if decision.paused() {
        format!("PAUSED {}A", decision.allowed_current())
    } else {
        format!("CHARGING {}A", decision.allowed_current())
    }
}

pub fn icon(decision: &Decision) -> &'static str {
    if decision.is_unplugged() {
        "mdi:power-plug-off"
    } else if decision.paused() {
        "mdi:pause"
    } else {
        "mdi:ev-station"
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn build_status_sensor(input: &ReportInput<'_>) -> StatusSensor {
    let meas = &input.snapshot.meas;
    let derived = &input.snapshot.derived;
    let decision = input.decision;

    let attributes = json!({
        "pv_power": round1(derived.pv_power),
        "pv_primary": round1(derived.pv_primary),
        "pv_secondary": round1(meas.pv_secondary),
        "secondary_active": derived.secondary_active,
        "home_power": round1(meas.house_power),
        "pv_excess": round1(derived.pv_excess),
        "batt_power": round1(meas.battery_power),
        "battery_soc": round1(meas.battery_soc),
        "grid_present": meas.grid_present,
        "decision_amp": decision.allowed_current(),
        "pause_mode": decision.paused(),
        "pause_reason": decision.reason_text(),
        "last_update": input.timestamp,
        "cycle_duration": input.cycle_duration_ms as f64 / 1000.0,
        "cycle_id": input.cycle_id,
        "friendly_name": "Wallbox Status",
        "icon": icon(decision),
        "version": env!("APP_VERSION"),
    });

    StatusSensor {
        state: state_text(decision),
        attributes,
    }
}
