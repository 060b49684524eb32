//! Watts to whole amperes, with hysteresis and the hardware floor.

use super::snapshot::Snapshot;
use crate::config::ControlParams;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quantized {
    /// Final current, 0 means pause
    pub amps: u32,
    /// Clamped current before rounding and hysteresis
    pub raw_amps: f64,
    /// Previous current kept because the change was too small
    pub held: bool,
}

pub fn quantize(
    available_power: f64,
    snapshot: &Snapshot,
    params: &ControlParams,
    last_applied: u32,
) -> Quantized {
    let meas = &snapshot.meas;
    let min_amps = meas.min_amps.max(0.0);
    let max_amps = meas.max_amps.max(min_amps);

    let raw_amps = raw_current(available_power, snapshot, params, min_amps, max_amps);

    let last = f64::from(last_applied);
    let hold = raw_amps > 0.0
        && last_applied > 0
        && (raw_amps - last).abs() < params.stabilization_delta_amp
        && last <= max_amps;

    let candidate = if hold {
        last_applied
    } else {
        raw_amps.round() as u32
    };

    // The charger refuses anything under its minimum
    let amps = if candidate > 0 && f64::from(candidate) < min_amps {
        0
    } else {
        candidate
    };

    Quantized {
        amps,
        raw_amps,
        held: hold && amps > 0,
    }
}

fn raw_current(
    available_power: f64,
    snapshot: &Snapshot,
    params: &ControlParams,
    min_amps: f64,
    max_amps: f64,
) -> f64 {
    let voltage = snapshot.meas.voltage;
    if available_power <= 0.0 || voltage <= 0.0 || available_power.is_nan() {
        return 0.0;
    }

    let amps = available_power / voltage;
    if amps >= min_amps {
        amps.clamp(min_amps, max_amps)
    } else if available_power
        >= snapshot.derived.min_wallbox_power * params.min_power_ratio_for_min_amps
    {
        min_amps
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::snapshot::Measurements;

    fn snap(min_amps: f64, max_amps: f64) -> Snapshot {
        let meas = Measurements {
            voltage: 230.0,
            min_amps,
            max_amps,
            ..Default::default()
        };
        Snapshot::new(meas, &ControlParams::default())
    }

    fn q(watts: f64, last: u32) -> Quantized {
        quantize(watts, &snap(6.0, 16.0), &ControlParams::default(), last)
    }

    #[test]
    fn rounds_to_nearest() {
        assert_eq!(q(2190.0, 0).amps, 10);
        assert_eq!(q(230.0 * 8.4, 0).amps, 8);
    }

    #[test]
    fn clamps_to_max() {
        assert_eq!(q(230.0 * 25.0, 0).amps, 16);
    }

    #[test]
    fn forces_minimum_near_threshold() {
        // 900 W / 230 V < 6 A but >= 0.6 * 1380 W
        assert_eq!(q(900.0, 0).amps, 6);
        assert_eq!(q(800.0, 0).amps, 0);
    }

    #[test]
    fn non_positive_budget_is_zero() {
        assert_eq!(q(0.0, 9).amps, 0);
        assert_eq!(q(-50.0, 9).amps, 0);
    }

    #[test]
    fn hysteresis_keeps_previous_current() {
        let r = q(230.0 * 9.6, 9);
        assert_eq!(r.amps, 9);
        assert!(r.held);

        let r = q(230.0 * 10.2, 9);
        assert_eq!(r.amps, 10);
        assert!(!r.held);
    }

    #[test]
    fn hysteresis_ignores_previous_above_max() {
        let r = quantize(
            230.0 * 20.0,
            &snap(6.0, 16.0),
            &ControlParams::default(),
            32,
        );
        assert_eq!(r.amps, 16);
    }

    #[test]
    fn fractional_minimum_collapses_to_zero() {
        let s = snap(6.5, 16.0);
        let r = quantize(230.0 * 6.5, &s, &ControlParams::default(), 0);
        assert_eq!(r.amps, 7);
        // Held 6 A sits under the 6.5 A floor
        let r = quantize(230.0 * 6.52, &s, &ControlParams::default(), 6);
        assert_eq!(r.amps, 0);
    }

    #[test]
    fn inverted_limits_do_not_panic() {
        let r = quantize(230.0 * 10.0, &snap(8.0, 6.0), &ControlParams::default(), 0);
        assert_eq!(r.amps, 8);
    }
}
