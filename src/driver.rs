//! Wallbox controller
//!
//! Runs the control cycle on a fixed period: read every entity, evaluate the
//! decision engine, command the charger, write the carried-over counters back,
//! reconcile notifications and publish the status sensor. A cycle never
//! aborts the loop; failures are logged and the next tick starts fresh.

use crate::config::Config;
use crate::engine::AlertSet;
use crate::ha::EntityStore;
use crate::logging::{StructuredLogger, get_logger};
use crate::persistence::PersistenceManager;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

mod actuation;
mod alerts;
pub mod ingest;
mod report;
mod runtime;
mod types;

#[cfg(test)]
mod tests;

pub use actuation::{MODE_NORMAL, MODE_PAUSED};
pub use alerts::{EV_EMERGENCY_ID, GRID_ABSENT_ID};
pub use report::{icon, state_text};
pub use types::{ActuationReport, ControllerStatus, CycleStepDurations, DriverState};

use alerts::AlertTracker;

/// Periodic PV/battery aware charge controller
pub struct WallboxController {
    config: Config,

    store: Arc<dyn EntityStore>,

    /// Current controller state
    state: watch::Sender<DriverState>,

    logger: StructuredLogger,

    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    persistence: PersistenceManager,

    alerts: AlertTracker,

    /// Broadcast channel for streaming live status updates (SSE)
    status_tx: broadcast::Sender<String>,

    /// Latest status for pull-style readers
    status_snapshot_tx: watch::Sender<Arc<ControllerStatus>>,
    status_snapshot_rx: watch::Receiver<Arc<ControllerStatus>>,

    total_cycles: u64,
    overrun_count: u64,
}

impl WallboxController {
    /// Create a controller over an entity store.
    ///
    /// Persisted notification flags are restored best-effort; an unreadable
    /// state file only costs a possible duplicate notification.
    pub fn new(config: Config, store: Arc<dyn EntityStore>) -> Self {
        let logger = get_logger("controller");
        logger.info("Initializing wallbox controller");

        let mut persistence = PersistenceManager::new(&config.state_file);
        if let Err(e) = persistence.load() {
            logger.warn(&format!(
                "Ignoring unreadable state file {}: {}",
                config.state_file, e
            ));
        }
        let alerts = AlertTracker::new(persistence.raised_alerts());

        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(DriverState::Initializing);
        let (status_tx, _status_rx) = broadcast::channel::<String>(100);
        let initial = Arc::new(ControllerStatus::initial(config.poll_interval_ms));
        let (status_snapshot_tx, status_snapshot_rx) = watch::channel(initial);
        let total_cycles = persistence.state().total_cycles;

        Self {
            config,
            store,
            state: state_tx,
            logger,
            shutdown_tx,
            shutdown_rx,
            persistence,
            alerts,
            status_tx,
            status_snapshot_tx,
            status_snapshot_rx,
            total_cycles,
            overrun_count: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sender that stops [`WallboxController::run`]
    pub fn get_shutdown_sender(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// Subscribe to status JSON, one message per cycle
    pub fn subscribe_status(&self) -> broadcast::Receiver<String> {
        self.status_tx.subscribe()
    }

    pub fn status_broadcaster(&self) -> broadcast::Sender<String> {
        self.status_tx.clone()
    }

    pub fn status_receiver(&self) -> watch::Receiver<Arc<ControllerStatus>> {
        self.status_snapshot_rx.clone()
    }

    pub fn state_receiver(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    pub fn raised_alerts(&self) -> AlertSet {
        self.alerts.raised()
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }
}
