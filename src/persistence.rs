//! Persistence layer for controller state
//!
//! Keeps the standing-notification flags and a summary of the last decision
//! in a small JSON file, so a restart neither re-raises notifications that are
//! already showing nor forgets to dismiss them.

use crate::engine::AlertSet;
use crate::error::Result;
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Summary of the most recent decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastDecision {
    /// RFC 3339 timestamp of the cycle
    pub timestamp: String,
    pub allowed_current: u32,
    pub paused: bool,
    pub reason: String,
}

/// Persistent state structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentState {
    /// Notifications currently raised in Home Assistant
    pub raised_alerts: AlertSet,

    pub last_decision: Option<LastDecision>,

    /// Completed cycles across restarts
    pub total_cycles: u64,
}

/// Persistence manager
pub struct PersistenceManager {
    file_path: String,
    state: PersistentState,
    logger: crate::logging::StructuredLogger,
}

impl PersistenceManager {
    /// Create a new persistence manager
    pub fn new(file_path: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            state: PersistentState::default(),
            logger: get_logger("persistence"),
        }
    }

    /// Load state from disk
    pub fn load(&mut self) -> Result<()> {
        let path = Path::new(&self.file_path);

        if !path.exists() {
            self.logger
                .info("No persistent state file found, using defaults");
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        self.state = serde_json::from_str(&contents)?;
        self.logger.info("Loaded persistent state from disk");

        Ok(())
    }

    /// Save state to disk, replacing the file atomically
    pub fn save(&self) -> Result<()> {
        let path = Path::new(&self.file_path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.state)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        self.logger.debug("Saved persistent state to disk");

        Ok(())
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn raised_alerts(&self) -> AlertSet {
        self.state.raised_alerts
    }

    pub fn set_raised_alerts(&mut self, alerts: AlertSet) {
        self.state.raised_alerts = alerts;
    }

    pub fn record_decision(&mut self, decision: LastDecision) {
        self.state.last_decision = Some(decision);
        self.state.total_cycles = self.state.total_cycles.saturating_add(1);
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }
}
