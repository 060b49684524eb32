//! Measurement ingestion: one read per configured entity, per cycle.
//!
//! Missing or malformed values fall back to per-field defaults and are
//! listed in [`Reading::missing`]; nothing here fails the cycle.

use crate::config::EntitiesConfig;
use crate::engine::{ConnectorState, Measurements, PriorState};
use crate::ha::{EntityState, EntityStore};
use crate::logging::StructuredLogger;
use chrono::{NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde_json::Value;

/// Everything read at the start of a cycle
#[derive(Debug, Clone)]
pub struct Reading {
    pub meas: Measurements,
    pub prior: PriorState,
    pub debug: bool,
    /// Entities that were absent or unusable, replaced by defaults
    pub missing: Vec<String>,
}

pub struct Ingestor<'a> {
    store: &'a dyn EntityStore,
    entities: &'a EntitiesConfig,
    tz: Tz,
    logger: &'a StructuredLogger,
    missing: Vec<String>,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        store: &'a dyn EntityStore,
        entities: &'a EntitiesConfig,
        tz: Tz,
        logger: &'a StructuredLogger,
    ) -> Self {
        Self {
            store,
            entities,
            tz,
            logger,
            missing: Vec::new(),
        }
    }

    pub async fn read(mut self) -> Reading {
        let e = self.entities;
        let defaults = Measurements::default();

        let debug = self.flag(&e.debug_mode, false).await;

        let connector = match self.fetch(&e.wallbox_state).await {
            Some(s) => ConnectorState::from_state(&s.state),
            None => ConnectorState::Other,
        };

        let last_tag_timestamp = match self.fetch(&e.last_tag_time).await {
            Some(s) => s.attribute("timestamp").and_then(value_f64),
            None => None,
        };
        let now_timestamp = match self.optional_number(&e.current_timestamp).await {
            Some(ts) if ts > 0.0 => ts,
            _ => Utc::now().timestamp() as f64,
        };

        let sun = self.fetch(&e.sun).await;
        let sun_elevation = sun
            .as_ref()
            .and_then(|s| s.attribute("elevation"))
            .and_then(value_f64)
            .unwrap_or(defaults.sun_elevation);
        let sun_rising = sun
            .as_ref()
            .and_then(|s| s.attribute("rising"))
            .and_then(value_bool)
            .unwrap_or(defaults.sun_rising);

        let time_of_day = match self.time(&e.time).await {
            Some(t) => t,
            None => truncate_to_minute(Utc::now().with_timezone(&self.tz).time()),
        };

        let meas = Measurements {
            voltage: self.number(&e.voltage, defaults.voltage).await,
            connector,
            last_tag_timestamp,
            now_timestamp,
            force_charge: self.flag(&e.force_charge, defaults.force_charge).await,
            pv_primary_1: self.number(&e.pv_primary_1, 0.0).await,
            pv_primary_2: self.number(&e.pv_primary_2, 0.0).await,
            pv_secondary: self.number(&e.pv_secondary, 0.0).await,
            pv_losses: self.number(&e.pv_losses, 0.0).await,
            battery_power: self.number(&e.batt_power, 0.0).await,
            battery_max_discharge: self
                .number(&e.batt_max_discharge, defaults.battery_max_discharge)
                .await,
            battery_soc: self.number(&e.batt_soc, 0.0).await,
            soc_floor: self.number(&e.batt_soc_min, 0.0).await,
            soc_priority: self.number(&e.batt_soc_priority, 0.0).await,
            house_power: self.number(&e.home_power, 0.0).await,
            house_current: self.number(&e.home_current, 0.0).await,
            house_max_current: self
                .number(&e.home_max_current, defaults.house_max_current)
                .await,
            wallbox_power: self.number(&e.wallbox_power, 0.0).await,
            ev_soc: self.optional_number(&e.ev_soc).await,
            ev_target_soc: self.number(&e.ev_target_soc, defaults.ev_target_soc).await,
            ev_emergency_soc: self
                .number(&e.ev_emergency_soc, defaults.ev_emergency_soc)
                .await,
            time_of_day,
            pause_start: self.time(&e.pause_start_time).await.unwrap_or(defaults.pause_start),
            pause_end: self.time(&e.pause_end_time).await.unwrap_or(defaults.pause_end),
            sun_elevation,
            sun_rising,
            elevation_threshold: self
                .number(&e.sun_elevation_threshold, defaults.elevation_threshold)
                .await,
            min_amps: self.number(&e.min_charge_amps, defaults.min_amps).await,
            max_amps: self.number(&e.max_charge_amps, defaults.max_amps).await,
            battery_priority_ratio: self
                .number(&e.battery_priority_ratio, defaults.battery_priority_ratio)
                .await,
            grid_present: self.flag(&e.grid_present, defaults.grid_present).await,
        };

        let prior = PriorState {
            last_applied_current: as_count(self.number(&e.last_wallbox_current, 0.0).await),
            battery_protection_cycles: as_count(self.number(&e.batt_protection_cycles, 0.0).await),
        };

        if !self.missing.is_empty() {
            self.logger.detail(&format!(
                "{} entities missing or unusable, defaults applied: {}",
                self.missing.len(),
                self.missing.join(", ")
            ));
        }

        Reading {
            meas,
            prior,
            debug,
            missing: self.missing,
        }
    }

    /// Entity state, `None` when absent, unavailable or unreadable
    async fn fetch(&mut self, entity_id: &str) -> Option<EntityState> {
        if entity_id.is_empty() {
            return None;
        }
        match self.store.get_state(entity_id).await {
            Ok(Some(state)) if state.is_available() => Some(state),
            Ok(_) => {
                self.missing.push(entity_id.to_string());
                None
            }
            Err(e) => {
                self.logger
                    .warn(&format!("Failed to read {}: {}", entity_id, e));
                self.missing.push(entity_id.to_string());
                None
            }
        }
    }

    async fn optional_number(&mut self, entity_id: &str) -> Option<f64> {
        let state = self.fetch(entity_id).await?;
        let parsed = parse_number(&state.state);
        if parsed.is_none() {
            self.logger.detail(&format!(
                "Non-numeric value for {}: '{}'",
                entity_id, state.state
            ));
            self.missing.push(entity_id.to_string());
        }
        parsed
    }

    async fn number(&mut self, entity_id: &str, default: f64) -> f64 {
        self.optional_number(entity_id).await.unwrap_or(default)
    }

    async fn flag(&mut self, entity_id: &str, default: bool) -> bool {
        match self.fetch(entity_id).await {
            Some(state) => parse_flag(&state.state).unwrap_or(default),
            None => default,
        }
    }

    async fn time(&mut self, entity_id: &str) -> Option<NaiveTime> {
        let state = self.fetch(entity_id).await?;
        let parsed = parse_time(&state.state);
        if parsed.is_none() {
            self.missing.push(entity_id.to_string());
        }
        parsed
    }
}

/// Finite decimal number, `None` otherwise
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" | "connected" | "home" => Some(true),
        "off" | "false" | "no" | "0" | "disconnected" | "not_home" => Some(false),
        _ => None,
    }
}

/// `HH:MM`, `HH:MM:SS` or a full `YYYY-MM-DD HH:MM:SS`, truncated to the minute
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    let time = NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
                .ok()
                .map(|dt| dt.time())
        })?;
    Some(truncate_to_minute(time))
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn value_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_flag(s),
        _ => None,
    }
}

/// Helper counters are stored as floats in `input_number` entities
fn as_count(value: f64) -> u32 {
    if value <= 0.0 {
        0
    } else {
        value.round().min(f64::from(u32::MAX)) as u32
    }
}
