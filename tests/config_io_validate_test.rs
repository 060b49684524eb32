use helios::config::Config;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.home_assistant.base_url = "http://10.0.0.5:8123".to_string();
    cfg.entities.voltage = "sensor.garage_voltage".to_string();
    cfg.params.post_tag_lock_seconds = 240.0;

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.home_assistant.base_url, "http://10.0.0.5:8123");
    assert_eq!(loaded.entities.voltage, "sensor.garage_voltage");
    assert_eq!(loaded.params.post_tag_lock_seconds, 240.0);
}

#[test]
fn saved_file_never_contains_the_token() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let mut cfg = Config::default();
    cfg.home_assistant.token = "very-secret".to_string();
    cfg.save_to_file(tmp.path()).unwrap();

    let contents = fs::read_to_string(tmp.path()).unwrap();
    assert!(!contents.contains("very-secret"));
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();
    assert!(cfg.validate().is_ok());

    cfg.home_assistant.base_url.clear();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.poll_interval_ms = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.timezone = "Mars/Olympus_Mons".to_string();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.entities.wallbox_set_current = "no_domain".to_string();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.params.pv_safety_margin_ratio = 1.5;
    assert!(cfg.validate().is_err());
}

#[test]
fn partial_yaml_keeps_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        b"timezone: Europe/Rome\nparams:\n  stabilization_delta_amp: 2.0\n",
    )
    .unwrap();
    let cfg = Config::from_file(tmp.path()).unwrap();

    assert_eq!(cfg.timezone, "Europe/Rome");
    assert_eq!(cfg.tz(), chrono_tz::Europe::Rome);
    assert_eq!(cfg.params.stabilization_delta_amp, 2.0);
    assert_eq!(cfg.params.post_tag_lock_seconds, 180.0);
    assert_eq!(cfg.poll_interval_ms, 45_000);
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}
