//! Configuration management for Helios
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable overrides.

use crate::error::{HeliosError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct Config {
    /// Home Assistant REST API connection
    pub home_assistant: HomeAssistantConfig,

    /// Entity ids read and written by the controller
    pub entities: EntitiesConfig,

    /// Control tunables of the decision engine
    pub params: ControlParams,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// Control cycle period in milliseconds
    pub poll_interval_ms: u64,

    /// Timezone used when the time-of-day entity is unavailable
    pub timezone: String,

    /// Path of the JSON state file (alert flags, last decision)
    pub state_file: String,
}

/// Home Assistant REST API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct HomeAssistantConfig {
    /// Base URL, e.g. `http://homeassistant.local:8123`
    pub base_url: String,

    /// Long-lived access token (never serialized back out)
    #[serde(skip_serializing)]
    pub token: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    /// Attempts per request on transport errors
    pub max_retries: u32,

    /// Initial backoff between attempts in milliseconds (doubles each retry)
    pub retry_delay_ms: u64,
}

/// Entity ids of every measurement, helper and actuator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct EntitiesConfig {
    /// `input_boolean` promoting cycle details to INFO
    pub debug_mode: String,
    /// Grid voltage sensor (V)
    pub voltage: String,
    /// Charger connector state sensor (`idle` means unplugged)
    pub wallbox_state: String,
    /// Unix timestamp sensor used as "now"
    pub current_timestamp: String,
    /// `select` entity for the charger mode (normal/paused)
    pub wallbox_set_mode: String,
    /// `number` entity for the charger current limit
    pub wallbox_set_current: String,
    /// `input_datetime` holding the last RFID tag use (attribute `timestamp`)
    pub last_tag_time: String,
    /// Primary inverter string 1 power (W)
    pub pv_primary_1: String,
    /// Primary inverter string 2 power (W)
    pub pv_primary_2: String,
    /// Secondary inverter PV power (W)
    pub pv_secondary: String,
    /// Inverter conversion losses (W)
    pub pv_losses: String,
    /// Battery power (W, positive = discharging)
    pub batt_power: String,
    /// Maximum battery discharge the controller tolerates (W)
    pub batt_max_discharge: String,
    /// Battery state of charge (%)
    pub batt_soc: String,
    /// Battery SOC floor (%)
    pub batt_soc_min: String,
    /// Upper bound of the priority band (%)
    pub batt_soc_priority: String,
    /// `input_number` holding the battery-protection cooldown counter
    pub batt_protection_cycles: String,
    /// Minimum charge current accepted by the charger (A)
    pub min_charge_amps: String,
    /// Maximum charge current (A)
    pub max_charge_amps: String,
    /// `input_boolean` forcing charge past the policy rules
    pub force_charge: String,
    /// House total power including the wallbox (W)
    pub home_power: String,
    /// House total current including the wallbox (A)
    pub home_current: String,
    /// Maximum current the house installation may draw (A)
    pub home_max_current: String,
    /// Wallbox output power (W)
    pub wallbox_power: String,
    /// Vehicle state of charge (%)
    pub ev_soc: String,
    /// Vehicle target state of charge (%)
    pub ev_target_soc: String,
    /// Vehicle SOC under which an emergency minimum charge is forced (%)
    pub ev_emergency_soc: String,
    /// Grid presence (`on` when the grid is connected)
    pub grid_present: String,
    /// Time-of-day sensor (`HH:MM`)
    pub time: String,
    /// `input_datetime` pause window start
    pub pause_start_time: String,
    /// `input_datetime` pause window end
    pub pause_end_time: String,
    /// Sun entity (attributes `elevation`, `rising`)
    pub sun: String,
    /// Elevation under which a setting sun pauses charging (°)
    pub sun_elevation_threshold: String,
    /// Share of the excess routed to the house battery in the priority band (%)
    pub battery_priority_ratio: String,
    /// `input_number` holding the last applied current
    pub last_wallbox_current: String,
    /// Status sensor written once per cycle
    pub status_sensor: String,
}

/// Numeric tunables of the decision engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct ControlParams {
    /// Lockout after an RFID tag use, in seconds
    pub post_tag_lock_seconds: f64,

    /// Changes smaller than this (A) keep the previously applied current
    pub stabilization_delta_amp: f64,

    /// Fraction of the minimum wallbox power that still forces the minimum current
    pub min_power_ratio_for_min_amps: f64,

    /// Secondary inverter counts as active above this power (W)
    pub min_secondary_inverter_power: f64,

    /// Fraction of the maximum battery discharge at which the charger is throttled
    pub batt_discharge_margin: f64,

    /// Extra headroom subtracted when throttling for battery discharge (W)
    pub discharge_buffer_watts: f64,

    /// PV excess under which battery discharge throttling always applies (W)
    pub low_excess_watts: f64,

    /// Above this battery SOC (%) all of the excess goes to the wallbox
    pub force_charge_soc_threshold: f64,

    /// Share of the excess kept back as a safety margin
    pub pv_safety_margin_ratio: f64,

    /// Cooldown cycles armed when the battery exceeds its maximum discharge
    pub batt_protection_cycles_on_fault: u32,

    /// Vehicle SOC (%) at or above which the emergency mode never applies
    pub ev_emergency_soc_cap: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct WebConfig {
    /// Whether the status API is served
    pub enabled: bool,

    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations, then apply env overrides
    pub fn load() -> Result<Self> {
        let default_paths = [
            "wallbox_config.yaml",
            "/data/wallbox_config.yaml",
            "/etc/wallbox/config.yaml",
        ];

        let mut config = Config::default();
        for path in &default_paths {
            if Path::new(path).exists() {
                config = Self::from_file(path)?;
                break;
            }
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Pick up the token from `HA_TOKEN` or, inside an add-on, `SUPERVISOR_TOKEN`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("HA_TOKEN")
            && !token.is_empty()
        {
            self.home_assistant.token = token;
        } else if self.home_assistant.token.is_empty()
            && let Ok(token) = std::env::var("SUPERVISOR_TOKEN")
            && !token.is_empty()
        {
            self.home_assistant.token = token;
            self.home_assistant.base_url = "http://supervisor/core".to_string();
        }
        if let Ok(url) = std::env::var("HA_BASE_URL")
            && !url.is_empty()
        {
            self.home_assistant.base_url = url;
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Configured timezone, UTC when the name is unknown
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.home_assistant.base_url.is_empty() {
            return Err(HeliosError::validation(
                "home_assistant.base_url",
                "URL cannot be empty",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(HeliosError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(HeliosError::validation(
                "timezone",
                "Unknown IANA timezone name",
            ));
        }

        for (field, id) in [
            ("entities.voltage", &self.entities.voltage),
            ("entities.wallbox_state", &self.entities.wallbox_state),
            ("entities.wallbox_set_mode", &self.entities.wallbox_set_mode),
            (
                "entities.wallbox_set_current",
                &self.entities.wallbox_set_current,
            ),
            ("entities.status_sensor", &self.entities.status_sensor),
        ] {
            if !id.contains('.') {
                return Err(HeliosError::validation(
                    field,
                    "Entity id must have the form domain.object_id",
                ));
            }
        }

        self.params.validate()
    }
}

impl ControlParams {
    /// Validate ranges of the tunables
    pub fn validate(&self) -> Result<()> {
        let unit_fractions = [
            ("params.batt_discharge_margin", self.batt_discharge_margin),
            (
                "params.min_power_ratio_for_min_amps",
                self.min_power_ratio_for_min_amps,
            ),
            ("params.pv_safety_margin_ratio", self.pv_safety_margin_ratio),
        ];
        for (field, value) in unit_fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(HeliosError::validation(field, "Must be within 0.0..=1.0"));
            }
        }

        if self.post_tag_lock_seconds < 0.0 {
            return Err(HeliosError::validation(
                "params.post_tag_lock_seconds",
                "Must not be negative",
            ));
        }

        if self.stabilization_delta_amp < 0.0 {
            return Err(HeliosError::validation(
                "params.stabilization_delta_amp",
                "Must not be negative",
            ));
        }

        if !(0.0..=100.0).contains(&self.force_charge_soc_threshold) {
            return Err(HeliosError::validation(
                "params.force_charge_soc_threshold",
                "Must be a percentage",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval_ms, 45_000);
        assert_eq!(config.params.post_tag_lock_seconds, 180.0);
        assert_eq!(config.params.batt_protection_cycles_on_fault, 3);
        assert_eq!(config.entities.status_sensor, "sensor.wallbox_status");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.home_assistant.base_url = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.entities.wallbox_set_current = "current".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.params.batt_discharge_margin = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization_skips_token() {
        let mut config = Config::default();
        config.home_assistant.token = "secret".to_string();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("secret"));
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.poll_interval_ms, deserialized.poll_interval_ms);
        assert!(deserialized.home_assistant.token.is_empty());
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let yaml = "params:\n  stabilization_delta_amp: 2.0\ntimezone: Europe/Rome\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.params.stabilization_delta_amp, 2.0);
        assert_eq!(config.params.pv_safety_margin_ratio, 0.1);
        assert_eq!(config.tz(), chrono_tz::Europe::Rome);
        assert_eq!(config.entities.voltage, "sensor.wallbox_grid_voltage");
    }
}
