//! Fast-path gates that end a cycle before any policy runs.

use super::decision::PauseReason;
use super::snapshot::{ConnectorState, Measurements, Snapshot};
use crate::config::ControlParams;

/// Unplugged connector, then the RFID lockout
pub fn preliminary_gate(meas: &Measurements, params: &ControlParams) -> Option<PauseReason> {
    if meas.connector == ConnectorState::Idle {
        return Some(PauseReason::ConnectorUnplugged);
    }

    if let Some(tag) = meas.last_tag_timestamp
        && tag > 0.0
        && meas.now_timestamp > 0.0
    {
        // A tag stamped in the future counts as just used
        let diff = (meas.now_timestamp - tag).max(0.0);
        if diff < params.post_tag_lock_seconds {
            let remaining = (params.post_tag_lock_seconds - diff).ceil() as u64;
            return Some(PauseReason::PostTagLock {
                remaining_secs: remaining,
            });
        }
    }

    None
}

/// Hard stops that no operator override can lift
pub fn safety_gate(snapshot: &Snapshot) -> Option<PauseReason> {
    let voltage = snapshot.meas.voltage;
    if voltage.is_nan() || voltage <= 0.0 {
        return Some(PauseReason::InvalidVoltage);
    }
    if snapshot.grid_absent_battery_low() {
        return Some(PauseReason::GridAbsentBatteryLow);
    }
    None
}
