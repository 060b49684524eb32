//! Charging decision engine
//!
//! A pure function of the cycle snapshot and the state carried over from the
//! previous cycle. Stages run in a fixed order and the first veto settles the
//! cycle:
//!
//! snapshot → preliminary gate → safety gate → pause rules → budget → quantizer
//!
//! Nothing in here performs I/O; the driver applies the returned decision and
//! stores the returned prior state.

pub mod budget;
pub mod decision;
pub mod gate;
pub mod quantize;
pub mod rules;
pub mod snapshot;

pub use budget::{Budget, Regime};
pub use decision::{AlertSet, ChargerCommand, Decision, PauseReason, PriorState, Stage};
pub use quantize::Quantized;
pub use snapshot::{ConnectorState, Derived, Measurements, Snapshot};

use crate::config::ControlParams;
use rules::RuleContext;
use serde::Serialize;

/// Everything one cycle produces
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub decision: Decision,
    /// State to feed into the next cycle
    pub next: PriorState,
    pub alerts: AlertSet,
    pub emergency: bool,
    /// Pause rule that settled the chain, if any
    pub rule: Option<&'static str>,
    pub budget: Option<Budget>,
    pub quantized: Option<Quantized>,
}

pub fn evaluate(snapshot: &Snapshot, prior: &PriorState, params: &ControlParams) -> CycleOutcome {
    let emergency = snapshot.ev_emergency(params);
    let alerts = AlertSet {
        ev_emergency: emergency,
        grid_absent_battery_low: snapshot.grid_absent_battery_low(),
    };
    let paused_next = PriorState {
        last_applied_current: 0,
        battery_protection_cycles: prior.battery_protection_cycles,
    };
    let mut outcome = CycleOutcome {
        decision: Decision::pause(PauseReason::CurrentBelowMinimum, Stage::Quantizer),
        next: paused_next,
        alerts,
        emergency,
        rule: None,
        budget: None,
        quantized: None,
    };

    if let Some(reason) = gate::preliminary_gate(&snapshot.meas, params) {
        outcome.decision = Decision::pause(reason, Stage::PreliminaryGate);
        return outcome;
    }

    if let Some(reason) = gate::safety_gate(snapshot) {
        outcome.decision = Decision::pause(reason, Stage::SafetyGate);
        return outcome;
    }

    let verdict = rules::evaluate_rules(&RuleContext {
        snapshot,
        prior,
        emergency,
    });
    outcome.rule = verdict.rule;
    outcome.next.battery_protection_cycles = next_protection_cycles(snapshot, prior, params, &verdict.veto);

    if let Some(reason) = verdict.veto {
        outcome.decision = Decision::pause(reason, Stage::PauseRules);
        return outcome;
    }

    let budget = budget::compute_budget(snapshot, params, emergency);
    if let Some(reason) = budget.veto.clone() {
        outcome.decision = Decision::pause(reason, Stage::Budget);
        outcome.budget = Some(budget);
        return outcome;
    }

    let quantized = quantize::quantize(
        budget.available_power,
        snapshot,
        params,
        prior.last_applied_current,
    );
    outcome.decision = Decision::charge(quantized.amps, Stage::Quantizer);
    outcome.next.last_applied_current = outcome.decision.allowed_current();
    outcome.budget = Some(budget);
    outcome.quantized = Some(quantized);
    outcome
}

/// Tick the cooldown down when it vetoed, re-arm it while the discharge fault persists
fn next_protection_cycles(
    snapshot: &Snapshot,
    prior: &PriorState,
    params: &ControlParams,
    veto: &Option<PauseReason>,
) -> u32 {
    let meas = &snapshot.meas;
    let mut cycles = match veto {
        Some(PauseReason::BatteryProtection { cycles_left }) => cycles_left.saturating_sub(1),
        _ => prior.battery_protection_cycles,
    };
    if !meas.force_charge
        && meas.battery_max_discharge > 0.0
        && meas.battery_power > meas.battery_max_discharge
    {
        cycles = cycles.max(params.batt_protection_cycles_on_fault);
    }
    cycles
}
