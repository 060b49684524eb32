use super::*;

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "http://homeassistant.local:8123".to_string(),
            token: String::new(),
            timeout_ms: 5000,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            debug_mode: "input_boolean.wallbox_debug".to_string(),
            voltage: "sensor.wallbox_grid_voltage".to_string(),
            wallbox_state: "sensor.wallbox_current_state".to_string(),
            current_timestamp: "sensor.current_timestamp".to_string(),
            wallbox_set_mode: "select.wallbox_set_mode".to_string(),
            wallbox_set_current: "number.wallbox_set_max_current".to_string(),
            last_tag_time: "input_datetime.last_wallbox_tag".to_string(),
            pv_primary_1: "sensor.inverter_pv1_power".to_string(),
            pv_primary_2: "sensor.inverter_pv2_power".to_string(),
            pv_secondary: "sensor.secondary_inverter_pv_power".to_string(),
            pv_losses: "sensor.inverter_power_losses".to_string(),
            batt_power: "sensor.battery_power".to_string(),
            batt_max_discharge: "input_number.battery_max_discharge".to_string(),
            batt_soc: "sensor.battery_soc".to_string(),
            batt_soc_min: "input_number.wallbox_soc_min".to_string(),
            batt_soc_priority: "input_number.wallbox_soc_priority".to_string(),
            batt_protection_cycles: "input_number.wallbox_batt_protection_cycles".to_string(),
            min_charge_amps: "input_number.wallbox_min_amps".to_string(),
            max_charge_amps: "input_number.wallbox_max_amps".to_string(),
            force_charge: "input_boolean.wallbox_force_charge".to_string(),
            home_power: "sensor.home_power".to_string(),
            home_current: "sensor.home_current".to_string(),
            home_max_current: "input_number.home_max_current".to_string(),
            wallbox_power: "sensor.wallbox_output_power".to_string(),
            ev_soc: "sensor.ev_battery_level".to_string(),
            ev_target_soc: "input_number.ev_target_soc".to_string(),
            ev_emergency_soc: "input_number.ev_emergency_soc".to_string(),
            grid_present: "binary_sensor.grid_present".to_string(),
            time: "sensor.time".to_string(),
            pause_start_time: "input_datetime.wallbox_pause_start".to_string(),
            pause_end_time: "input_datetime.wallbox_pause_end".to_string(),
            sun: "sun.sun".to_string(),
            sun_elevation_threshold: "input_number.wallbox_sun_elevation".to_string(),
            battery_priority_ratio: "input_number.wallbox_battery_priority_ratio".to_string(),
            last_wallbox_current: "input_number.last_wallbox_current".to_string(),
            status_sensor: "sensor.wallbox_status".to_string(),
        }
    }
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            post_tag_lock_seconds: 180.0,
            stabilization_delta_amp: 1.0,
            min_power_ratio_for_min_amps: 0.6,
            min_secondary_inverter_power: 100.0,
            batt_discharge_margin: 0.8,
            discharge_buffer_watts: 50.0,
            low_excess_watts: 100.0,
            force_charge_soc_threshold: 95.0,
            pv_safety_margin_ratio: 0.1,
            batt_protection_cycles_on_fault: 3,
            ev_emergency_soc_cap: 99.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/helios.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home_assistant: HomeAssistantConfig::default(),
            entities: EntitiesConfig::default(),
            params: ControlParams::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            poll_interval_ms: 45_000,
            timezone: "UTC".to_string(),
            state_file: "/data/helios_state.json".to_string(),
        }
    }
}
