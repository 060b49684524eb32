//! Decision record, pause reasons and the cross-cycle prior state.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a cycle ended paused
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PauseReason {
    ConnectorUnplugged,
    PostTagLock { remaining_secs: u64 },
    InvalidVoltage,
    GridAbsentBatteryLow,
    TargetReached { ev_soc: f64, target: f64 },
    HouseOvercurrent { current: f64, max: f64 },
    PauseWindow { start: NaiveTime, end: NaiveTime },
    BatteryCritical { soc: f64, floor: f64 },
    BatteryProtection { cycles_left: u32 },
    SunTooLow { elevation: f64 },
    CurrentBelowMinimum,
}

impl PauseReason {
    /// Stable machine-readable identifier
    pub fn code(&self) -> &'static str {
        match self {
            PauseReason::ConnectorUnplugged => "connector_unplugged",
            PauseReason::PostTagLock { .. } => "post_tag_lock",
            PauseReason::InvalidVoltage => "invalid_voltage",
            PauseReason::GridAbsentBatteryLow => "grid_absent_battery_low",
            PauseReason::TargetReached { .. } => "target_reached",
            PauseReason::HouseOvercurrent { .. } => "house_overcurrent",
            PauseReason::PauseWindow { .. } => "pause_window",
            PauseReason::BatteryCritical { .. } => "battery_critical",
            PauseReason::BatteryProtection { .. } => "battery_protection",
            PauseReason::SunTooLow { .. } => "sun_too_low",
            PauseReason::CurrentBelowMinimum => "current_below_minimum",
        }
    }

    /// Hard safety faults force the charger into paused mode
    pub fn is_safety_fault(&self) -> bool {
        matches!(
            self,
            PauseReason::InvalidVoltage | PauseReason::GridAbsentBatteryLow
        )
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::ConnectorUnplugged => write!(f, "connector unplugged"),
            PauseReason::PostTagLock { remaining_secs } => {
                write!(f, "post-tag lock ({}s remaining)", remaining_secs)
            }
            PauseReason::InvalidVoltage => write!(f, "invalid voltage"),
            PauseReason::GridAbsentBatteryLow => write!(f, "grid absent and battery low"),
            PauseReason::TargetReached { ev_soc, target } => {
                write!(f, "target reached ({:.1}% >= {:.1}%)", ev_soc, target)
            }
            PauseReason::HouseOvercurrent { current, max } => {
                write!(f, "house overcurrent ({:.1}A > {:.1}A)", current, max)
            }
            PauseReason::PauseWindow { start, end } => write!(
                f,
                "pause window active ({}-{})",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            PauseReason::BatteryCritical { soc, floor } => {
                write!(f, "battery critical ({:.1}% < {:.1}%)", soc, floor)
            }
            PauseReason::BatteryProtection { cycles_left } => {
                write!(f, "battery protection active ({} cycles left)", cycles_left)
            }
            PauseReason::SunTooLow { elevation } => {
                write!(f, "sun too low ({:.1}°)", elevation)
            }
            PauseReason::CurrentBelowMinimum => write!(f, "current below minimum"),
        }
    }
}

/// Pipeline stage that settled the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreliminaryGate,
    SafetyGate,
    PauseRules,
    Budget,
    Quantizer,
}

/// Command the actuation layer derives from a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargerCommand {
    /// Leave the charger alone
    None,
    /// Select the paused mode
    Pause,
    /// Set the current, then select the normal mode
    Charge(u32),
}

/// Result of one control cycle.
///
/// `paused` is true exactly when `allowed_current` is 0, and a paused decision
/// always carries a reason. The constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    allowed_current: u32,
    paused: bool,
    reason: Option<PauseReason>,
    stage: Stage,
}

impl Decision {
    pub fn pause(reason: PauseReason, stage: Stage) -> Self {
        Self {
            allowed_current: 0,
            paused: true,
            reason: Some(reason),
            stage,
        }
    }

    /// Charge at `amps`; zero collapses into a below-minimum pause
    pub fn charge(amps: u32, stage: Stage) -> Self {
        if amps == 0 {
            return Self::pause(PauseReason::CurrentBelowMinimum, stage);
        }
        Self {
            allowed_current: amps,
            paused: false,
            reason: None,
            stage,
        }
    }

    pub fn allowed_current(&self) -> u32 {
        self.allowed_current
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn reason(&self) -> Option<&PauseReason> {
        self.reason.as_ref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Reason text, `"active"` while charging
    pub fn reason_text(&self) -> String {
        self.reason
            .as_ref()
            .map_or_else(|| "active".to_string(), ToString::to_string)
    }

    pub fn is_unplugged(&self) -> bool {
        matches!(self.reason, Some(PauseReason::ConnectorUnplugged))
    }

    pub fn command(&self) -> ChargerCommand {
        match (&self.reason, self.stage) {
            (None, _) => ChargerCommand::Charge(self.allowed_current),
            (Some(_), Stage::PreliminaryGate) => ChargerCommand::None,
            (Some(_), _) => ChargerCommand::Pause,
        }
    }
}

/// State carried from one cycle into the next
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorState {
    /// Current applied by the previous cycle, 0 after a pause
    pub last_applied_current: u32,
    /// Remaining battery-protection cooldown cycles
    pub battery_protection_cycles: u32,
}

/// Standing notification triggers, re-evaluated every cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSet {
    pub ev_emergency: bool,
    pub grid_absent_battery_low: bool,
}
