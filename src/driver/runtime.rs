use std::sync::Arc;
use std::time::Instant;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::engine::{self, CycleOutcome, Snapshot};
use crate::error::Result;
use crate::logging::set_detail_promoted;
use crate::persistence::LastDecision;

use super::actuation::{apply_command, write_back_prior};
use super::ingest::Ingestor;
use super::report::{ReportInput, build_status_sensor};
use super::types::{ControllerStatus, CycleStepDurations, DriverState};

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

impl super::WallboxController {
    /// Run the control loop until a shutdown signal arrives
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info(&format!(
            "Starting wallbox control loop (period {} ms)",
            self.config.poll_interval_ms
        ));
        self.state.send_replace(DriverState::Running);

        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        // A slow cycle pushes the next one back instead of bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle_with_deadline().await;
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.state.send_replace(DriverState::ShuttingDown);
        self.shutdown().await
    }

    /// Run one cycle, abandoning it once it outlasts the poll period.
    /// An abandoned cycle records no decision and returns `None`.
    pub async fn run_cycle_with_deadline(&mut self) -> Option<CycleOutcome> {
        let deadline = Duration::from_millis(self.config.poll_interval_ms.max(1));
        match tokio::time::timeout(deadline, self.run_cycle()).await {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                self.overrun_count = self.overrun_count.saturating_add(1);
                let message = format!(
                    "cycle abandoned after {} ms without completing",
                    deadline.as_millis()
                );
                self.logger.error(&format!("Control {}", message));
                self.state.send_replace(DriverState::Error(message));
                None
            }
        }
    }

    /// One complete control cycle.
    ///
    /// Always produces exactly one decision and one status update, whatever
    /// Home Assistant answers.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let cycle_started = Instant::now();
        let cycle_id = uuid::Uuid::new_v4().to_string();
        let logger = self.logger.for_cycle(&cycle_id[..8]);
        let mut steps = CycleStepDurations::default();
        let store = Arc::clone(&self.store);
        let entities = &self.config.entities;
        let params = &self.config.params;

        let t = Instant::now();
        let reading = Ingestor::new(store.as_ref(), entities, self.config.tz(), &logger)
            .read()
            .await;
        steps.ingest_ms = Some(elapsed_ms(t));
        set_detail_promoted(reading.debug);
        logger.detail("Cycle started");

        let t = Instant::now();
        let snapshot = Snapshot::new(reading.meas, params);
        let outcome = engine::evaluate(&snapshot, &reading.prior, params);
        steps.evaluate_ms = Some(elapsed_ms(t));
        self.log_decision(&logger, &snapshot, &outcome);

        let command = outcome.decision.command();
        let t = Instant::now();
        let actuation = apply_command(store.as_ref(), entities, command, &logger).await;
        if actuation.commands_sent > 0 || !actuation.failures.is_empty() {
            steps.actuate_ms = Some(elapsed_ms(t));
        }

        let stored_prior = if outcome.next != reading.prior {
            let t = Instant::now();
            let stored =
                write_back_prior(store.as_ref(), entities, &reading.prior, &outcome.next, &logger)
                    .await;
            steps.write_back_ms = Some(elapsed_ms(t));
            if stored != outcome.next {
                logger.warn("Carried-over state not fully stored, retrying next cycle");
            }
            stored
        } else {
            reading.prior
        };

        let t = Instant::now();
        if self
            .alerts
            .sync(store.as_ref(), &outcome.alerts, &logger)
            .await
        {
            steps.alerts_ms = Some(elapsed_ms(t));
            self.persistence.set_raised_alerts(self.alerts.raised());
        }

        let timestamp = chrono::Utc::now().to_rfc3339();
        let t = Instant::now();
        let sensor = build_status_sensor(&ReportInput {
            snapshot: &snapshot,
            decision: &outcome.decision,
            cycle_id: &cycle_id,
            cycle_duration_ms: elapsed_ms(cycle_started),
            timestamp: &timestamp,
        });
        if let Err(e) = store
            .set_state(
                &self.config.entities.status_sensor,
                &sensor.state,
                sensor.attributes,
            )
            .await
        {
            logger.error(&format!("Failed to publish status sensor: {}", e));
        }
        steps.report_ms = Some(elapsed_ms(t));

        self.total_cycles = self.total_cycles.saturating_add(1);
        self.persistence.record_decision(LastDecision {
            timestamp: timestamp.clone(),
            allowed_current: outcome.decision.allowed_current(),
            paused: outcome.decision.paused(),
            reason: outcome.decision.reason_text(),
        });
        if let Err(e) = self.persistence.save() {
            logger.warn(&format!("Failed to save state file: {}", e));
        }

        let ha_connected = store.connection_status();
        self.refresh_driver_state(ha_connected);

        let status = ControllerStatus {
            timestamp,
            cycle_id: Some(cycle_id),
            driver_state: self.state.borrow().label(),
            allowed_current: outcome.decision.allowed_current(),
            paused: outcome.decision.paused(),
            reason: outcome.decision.reason_text(),
            reason_code: outcome.decision.reason().map(|r| r.code().to_string()),
            stage: Some(outcome.decision.stage()),
            rule: outcome.rule.map(str::to_string),
            emergency: outcome.emergency,
            alerts: self.alerts.raised(),
            battery_protection_cycles: outcome.next.battery_protection_cycles,
            stored_prior,
            measurements: Some(snapshot.meas.clone()),
            derived: Some(snapshot.derived),
            budget: outcome.budget.clone(),
            quantized: outcome.quantized,
            actuation,
            steps,
            cycle_duration_ms: Some(elapsed_ms(cycle_started)),
            total_cycles: self.total_cycles,
            overrun_count: self.overrun_count,
            poll_interval_ms: self.config.poll_interval_ms,
            debug_mode: reading.debug,
            ha_connected,
        };
        self.publish_status(status);
        logger.detail("Cycle finished");

        outcome
    }

    fn log_decision(
        &self,
        logger: &crate::logging::StructuredLogger,
        snapshot: &Snapshot,
        outcome: &CycleOutcome,
    ) {
        let d = &snapshot.derived;
        let m = &snapshot.meas;
        logger.detail(&format!(
            "PV {:.0}W (excess {:.0}W, secondary {}), battery {:.0}W at {:.1}%, grid {}",
            d.pv_power,
            d.pv_excess,
            if d.secondary_active { "on" } else { "off" },
            m.battery_power,
            m.battery_soc,
            if m.grid_present { "present" } else { "absent" },
        ));
        if let Some(budget) = &outcome.budget {
            logger.detail(&format!(
                "Budget {:.0}W via {:?}",
                budget.available_power, budget.regime
            ));
        }

        let previous = self.status_snapshot_rx.borrow();
        let decision = &outcome.decision;
        let changed = previous.allowed_current != decision.allowed_current()
            || previous.reason_code.as_deref() != decision.reason().map(|r| r.code());
        let message = format!(
            "Decision: {}A, {} ({:?})",
            decision.allowed_current(),
            decision.reason_text(),
            decision.stage()
        );
        if changed {
            logger.info(&message);
        } else {
            logger.detail(&message);
        }
        if decision.reason().is_some_and(|r| r.is_safety_fault()) {
            logger.warn(&format!("Safety stop: {}", decision.reason_text()));
        }
    }

    /// Error while Home Assistant is unreachable, back to running once it answers
    fn refresh_driver_state(&self, ha_connected: Option<bool>) {
        let in_error = matches!(*self.state.borrow(), DriverState::Error(_));
        if ha_connected == Some(false) {
            self.state.send_replace(DriverState::Error(
                "Home Assistant unreachable".to_string(),
            ));
        } else if in_error {
            self.state.send_replace(DriverState::Running);
        }
    }

    fn publish_status(&self, status: ControllerStatus) {
        match serde_json::to_string(&status) {
            Ok(json) => {
                // No subscribers is fine
                let _ = self.status_tx.send(json);
            }
            Err(e) => self
                .logger
                .warn(&format!("Failed to serialize status: {}", e)),
        }
        let _ = self.status_snapshot_tx.send(Arc::new(status));
    }

    /// Persist state before exiting
    pub async fn shutdown(&mut self) -> Result<()> {
        self.logger.info("Shutting down wallbox controller");
        self.persistence.save()?;
        Ok(())
    }
}
