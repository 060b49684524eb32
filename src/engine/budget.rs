//! Power budget for the charger, in watts.

use super::decision::PauseReason;
use super::snapshot::Snapshot;
use crate::config::ControlParams;
use serde::Serialize;

/// Operating regime that produced the budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// Setting sun, charging vetoed
    LowSun,
    /// Vehicle below its emergency SOC, minimum current forced
    Emergency,
    /// Battery discharging too hard, charger throttled down (emergency included)
    DischargeThrottle,
    /// Battery under its floor, nothing available
    BelowFloor,
    /// Battery inside the priority band, excess split with the battery
    PrioritySplit,
    /// Battery nearly full, the whole excess goes to the charger
    FullExcess,
    /// Battery above the priority band, excess minus a safety margin
    Eco,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Budget {
    pub available_power: f64,
    pub regime: Regime,
    /// Excess after the dormant-inverter stimulus, when excess budgeting ran
    pub effective_excess: Option<f64>,
    pub veto: Option<PauseReason>,
}

impl Budget {
    fn settled(available_power: f64, regime: Regime) -> Self {
        Self {
            available_power: available_power.max(0.0),
            regime,
            effective_excess: None,
            veto: None,
        }
    }
}

pub fn compute_budget(snapshot: &Snapshot, params: &ControlParams, emergency: bool) -> Budget {
    let meas = &snapshot.meas;
    let derived = &snapshot.derived;

    if !emergency && meas.sun_elevation < meas.elevation_threshold && !meas.sun_rising {
        return Budget {
            available_power: 0.0,
            regime: Regime::LowSun,
            effective_excess: None,
            veto: Some(PauseReason::SunTooLow {
                elevation: meas.sun_elevation,
            }),
        };
    }

    let discharge_limit = meas.battery_max_discharge * params.batt_discharge_margin;
    if !meas.force_charge
        && meas.battery_power > discharge_limit
        && (derived.pv_excess < params.low_excess_watts || meas.battery_soc < meas.soc_priority)
    {
        let over = meas.battery_power - discharge_limit;
        let throttled = meas.wallbox_power - over - params.discharge_buffer_watts;
        return Budget::settled(throttled, Regime::DischargeThrottle);
    }

    if emergency {
        return Budget::settled(meas.min_amps * meas.voltage, Regime::Emergency);
    }

    excess_budget(snapshot, params)
}

fn excess_budget(snapshot: &Snapshot, params: &ControlParams) -> Budget {
    let meas = &snapshot.meas;
    let derived = &snapshot.derived;
    let min_wb = derived.min_wallbox_power;
    let min_forcing = min_wb * params.min_power_ratio_for_min_amps;

    let mut effective = derived.pv_excess;
    if !derived.secondary_active
        && meas.battery_soc >= meas.soc_floor
        && derived.secondary_potential > min_wb
    {
        effective += derived.secondary_potential;
    }

    let (available, regime) = if meas.battery_soc < meas.soc_floor {
        (0.0, Regime::BelowFloor)
    } else if meas.battery_soc < meas.soc_priority {
        let available = if effective >= min_wb {
            let above_min = effective - min_wb;
            let battery_share = above_min * meas.battery_priority_ratio / 100.0;
            min_wb + above_min - battery_share
        } else {
            0.0
        };
        (available, Regime::PrioritySplit)
    } else if meas.battery_soc > params.force_charge_soc_threshold {
        (
            clear_minimum(effective, min_wb, min_forcing),
            Regime::FullExcess,
        )
    } else {
        let adjusted = effective - effective * params.pv_safety_margin_ratio;
        (clear_minimum(adjusted, min_wb, min_forcing), Regime::Eco)
    };

    Budget {
        effective_excess: Some(effective),
        ..Budget::settled(available, regime)
    }
}

/// The excess itself above the minimum, the minimum near it, nothing otherwise
fn clear_minimum(excess: f64, min_wb: f64, min_forcing: f64) -> f64 {
    if excess >= min_wb {
        excess
    } else if excess >= min_forcing {
        min_wb
    } else {
        0.0
    }
}
