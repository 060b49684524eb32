use crate::engine::{AlertSet, Budget, Derived, Measurements, PriorState, Quantized, Stage};
use serde::{Deserialize, Serialize};

/// Controller lifecycle state
#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    /// Controller is initializing
    Initializing,
    /// Controller is running normally
    Running,
    /// Controller is in error state
    Error(String),
    /// Controller is shutting down
    ShuttingDown,
}

impl DriverState {
    pub fn label(&self) -> String {
        match self {
            DriverState::Initializing => "Initializing".to_string(),
            DriverState::Running => "Running".to_string(),
            DriverState::Error(e) => format!("Error: {}", e),
            DriverState::ShuttingDown => "ShuttingDown".to_string(),
        }
    }
}

/// Per-step timings of a single control cycle in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CycleStepDurations {
    /// Read every configured entity
    pub ingest_ms: Option<u64>,
    /// Run the decision engine
    pub evaluate_ms: Option<u64>,
    /// Charger commands (only when any were issued)
    pub actuate_ms: Option<u64>,
    /// Helper write-back of the prior state (only when it changed)
    pub write_back_ms: Option<u64>,
    /// Raise or dismiss notifications (only on transitions)
    pub alerts_ms: Option<u64>,
    /// Status sensor publication
    pub report_ms: Option<u64>,
}

/// Outcome of the actuation step
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActuationReport {
    /// Service calls that succeeded
    pub commands_sent: u32,
    /// Failed calls, as `domain.service: error`
    pub failures: Vec<String>,
}

impl ActuationReport {
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Latest controller status, shared with the web layer
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub timestamp: String,
    pub cycle_id: Option<String>,
    pub driver_state: String,
    pub allowed_current: u32,
    pub paused: bool,
    pub reason: String,
    pub reason_code: Option<String>,
    pub stage: Option<Stage>,
    pub rule: Option<String>,
    pub emergency: bool,
    pub alerts: AlertSet,
    pub battery_protection_cycles: u32,
    /// Carried-over state as actually stored in Home Assistant
    pub stored_prior: PriorState,
    pub measurements: Option<Measurements>,
    pub derived: Option<Derived>,
    pub budget: Option<Budget>,
    pub quantized: Option<Quantized>,
    pub actuation: ActuationReport,
    pub steps: CycleStepDurations,
    pub cycle_duration_ms: Option<u64>,
    pub total_cycles: u64,
    pub overrun_count: u64,
    pub poll_interval_ms: u64,
    pub debug_mode: bool,
    pub ha_connected: Option<bool>,
}

impl ControllerStatus {
    /// Status before the first cycle has completed
    pub fn initial(poll_interval_ms: u64) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            cycle_id: None,
            driver_state: DriverState::Initializing.label(),
            allowed_current: 0,
            paused: true,
            reason: "not started".to_string(),
            reason_code: None,
            stage: None,
            rule: None,
            emergency: false,
            alerts: AlertSet::default(),
            battery_protection_cycles: 0,
            stored_prior: PriorState::default(),
            measurements: None,
            derived: None,
            budget: None,
            quantized: None,
            actuation: ActuationReport::default(),
            steps: CycleStepDurations::default(),
            cycle_duration_ms: None,
            total_cycles: 0,
            overrun_count: 0,
            poll_interval_ms,
            debug_mode: false,
            ha_connected: None,
        }
    }
}
