use super::types::ActuationReport;
use crate::config::EntitiesConfig;
use crate::engine::{ChargerCommand, PriorState};
use crate::error::{HeliosError, Result};
use crate::ha::EntityStore;
use crate::logging::StructuredLogger;
use serde_json::{Value, json};

pub const MODE_NORMAL: &str = "normal";
pub const MODE_PAUSED: &str = "paused";

/// Issue the charger commands for one decision.
///
/// A failed current write leaves the mode untouched so the charger never
/// runs in normal mode on a current it did not accept.
pub async fn apply_command(
    store: &dyn EntityStore,
    entities: &EntitiesConfig,
    command: ChargerCommand,
    logger: &StructuredLogger,
) -> ActuationReport {
    let mut report = ActuationReport::default();
    match command {
        ChargerCommand::None => {}
        ChargerCommand::Pause => {
            select_mode(store, entities, MODE_PAUSED, logger, &mut report).await;
        }
        ChargerCommand::Charge(amps) => {
            let data = json!({ "entity_id": entities.wallbox_set_current, "value": amps });
            match send(store, "number", "set_value", data).await {
                Ok(()) => {
                    report.commands_sent += 1;
                    logger.detail(&format!("Charge current set to {}A", amps));
                    select_mode(store, entities, MODE_NORMAL, logger, &mut report).await;
                }
                Err(e) => {
                    logger.error(&format!("Failed to set charge current to {}A: {}", amps, e));
                    report.failures.push(e.to_string());
                }
            }
        }
    }
    report
}

/// Charger service call, failures reported as actuation errors
async fn send(store: &dyn EntityStore, domain: &str, service: &str, data: Value) -> Result<()> {
    store
        .call_service(domain, service, data)
        .await
        .map_err(|e| HeliosError::actuation(format!("{}.{}: {}", domain, service, e)))
}

async fn select_mode(
    store: &dyn EntityStore,
    entities: &EntitiesConfig,
    option: &str,
    logger: &StructuredLogger,
    report: &mut ActuationReport,
) {
    let data = json!({ "entity_id": entities.wallbox_set_mode, "option": option });
    match send(store, "select", "select_option", data).await {
        Ok(()) => report.commands_sent += 1,
        Err(e) => {
            logger.error(&format!("Failed to select charger mode '{}': {}", option, e));
            report.failures.push(e.to_string());
        }
    }
}

/// Write changed prior-state fields back to their helpers.
///
/// Returns the prior state as it now stands in Home Assistant. A field whose
/// write failed keeps its previous value; the next cycle re-reads the helper
/// and writes it again.
pub async fn write_back_prior(
    store: &dyn EntityStore,
    entities: &EntitiesConfig,
    previous: &PriorState,
    next: &PriorState,
    logger: &StructuredLogger,
) -> PriorState {
    let mut stored = *previous;

    if next.last_applied_current != previous.last_applied_current
        && set_helper(
            store,
            &entities.last_wallbox_current,
            next.last_applied_current,
            logger,
        )
        .await
    {
        stored.last_applied_current = next.last_applied_current;
    }

    if next.battery_protection_cycles != previous.battery_protection_cycles
        && set_helper(
            store,
            &entities.batt_protection_cycles,
            next.battery_protection_cycles,
            logger,
        )
        .await
    {
        stored.battery_protection_cycles = next.battery_protection_cycles;
    }

    stored
}

async fn set_helper(
    store: &dyn EntityStore,
    entity_id: &str,
    value: u32,
    logger: &StructuredLogger,
) -> bool {
    let data = json!({ "entity_id": entity_id, "value": value });
    match store.call_service("input_number", "set_value", data).await {
        Ok(()) => true,
        Err(e) => {
            logger.warn(&format!("Failed to write {} = {}: {}", entity_id, value, e));
            false
        }
    }
}
