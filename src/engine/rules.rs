//! Ordered pause-rule chain.
//!
//! Rules are evaluated top to bottom and the first one that does not pass
//! settles the outcome. The order of [`PAUSE_RULES`] is part of the policy.

use super::decision::{PauseReason, PriorState};
use super::snapshot::Snapshot;

/// Inputs visible to every rule
pub struct RuleContext<'a> {
    pub snapshot: &'a Snapshot,
    pub prior: &'a PriorState,
    /// Shared EV-emergency predicate, computed once per cycle
    pub emergency: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// Not applicable, continue with the next rule
    Pass,
    /// Stop evaluating, charging allowed
    Allow,
    /// Stop evaluating, charging vetoed
    Veto(PauseReason),
}

pub struct PauseRule {
    pub name: &'static str,
    pub check: fn(&RuleContext<'_>) -> RuleOutcome,
}

pub const PAUSE_RULES: &[PauseRule] = &[
    PauseRule {
        name: "forced_charge",
        check: forced_charge,
    },
    PauseRule {
        name: "ev_target",
        check: ev_target,
    },
    PauseRule {
        name: "house_overcurrent",
        check: house_overcurrent,
    },
    PauseRule {
        name: "pause_window",
        check: pause_window,
    },
    PauseRule {
        name: "battery_floor",
        check: battery_floor,
    },
    PauseRule {
        name: "battery_protection",
        check: battery_protection,
    },
];

/// Which rule settled the chain, if any, and its veto
#[derive(Debug, Clone, PartialEq)]
pub struct RuleVerdict {
    pub rule: Option<&'static str>,
    pub veto: Option<PauseReason>,
}

pub fn evaluate_rules(ctx: &RuleContext<'_>) -> RuleVerdict {
    run_chain(PAUSE_RULES, ctx)
}

fn run_chain(rules: &[PauseRule], ctx: &RuleContext<'_>) -> RuleVerdict {
    for rule in rules {
        match (rule.check)(ctx) {
            RuleOutcome::Pass => continue,
            RuleOutcome::Allow => {
                return RuleVerdict {
                    rule: Some(rule.name),
                    veto: None,
                };
            }
            RuleOutcome::Veto(reason) => {
                return RuleVerdict {
                    rule: Some(rule.name),
                    veto: Some(reason),
                };
            }
        }
    }
    RuleVerdict {
        rule: None,
        veto: None,
    }
}

fn forced_charge(ctx: &RuleContext<'_>) -> RuleOutcome {
    if ctx.snapshot.meas.force_charge {
        RuleOutcome::Allow
    } else {
        RuleOutcome::Pass
    }
}

fn ev_target(ctx: &RuleContext<'_>) -> RuleOutcome {
    let meas = &ctx.snapshot.meas;
    match meas.ev_soc {
        Some(soc) if soc >= meas.ev_target_soc => RuleOutcome::Veto(PauseReason::TargetReached {
            ev_soc: soc,
            target: meas.ev_target_soc,
        }),
        _ => RuleOutcome::Pass,
    }
}

fn house_overcurrent(ctx: &RuleContext<'_>) -> RuleOutcome {
    let meas = &ctx.snapshot.meas;
    if meas.house_current > meas.house_max_current {
        RuleOutcome::Veto(PauseReason::HouseOvercurrent {
            current: meas.house_current,
            max: meas.house_max_current,
        })
    } else {
        RuleOutcome::Pass
    }
}

fn pause_window(ctx: &RuleContext<'_>) -> RuleOutcome {
    if ctx.emergency || !ctx.snapshot.in_pause_window() {
        return RuleOutcome::Pass;
    }
    RuleOutcome::Veto(PauseReason::PauseWindow {
        start: ctx.snapshot.meas.pause_start,
        end: ctx.snapshot.meas.pause_end,
    })
}

fn battery_floor(ctx: &RuleContext<'_>) -> RuleOutcome {
    let meas = &ctx.snapshot.meas;
    if !ctx.emergency && meas.battery_soc < meas.soc_floor {
        RuleOutcome::Veto(PauseReason::BatteryCritical {
            soc: meas.battery_soc,
            floor: meas.soc_floor,
        })
    } else {
        RuleOutcome::Pass
    }
}

/// The counter itself is decremented in the next prior state
fn battery_protection(ctx: &RuleContext<'_>) -> RuleOutcome {
    match ctx.prior.battery_protection_cycles {
        0 => RuleOutcome::Pass,
        cycles_left => RuleOutcome::Veto(PauseReason::BatteryProtection { cycles_left }),
    }
}
