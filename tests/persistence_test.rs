use helios::engine::AlertSet;
use helios::persistence::{LastDecision, PersistenceManager, PersistentState};

#[test]
fn default_state_values() {
    let s = PersistentState::default();
    assert_eq!(s.raised_alerts, AlertSet::default());
    assert!(s.last_decision.is_none());
    assert_eq!(s.total_cycles, 0);
}

#[test]
fn load_save_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nested/state.json").to_string_lossy().to_string();

    let mut mgr = PersistenceManager::new(&path);
    mgr.set_raised_alerts(AlertSet {
        ev_emergency: true,
        grid_absent_battery_low: false,
    });
    mgr.record_decision(LastDecision {
        timestamp: "2025-10-12T09:00:00Z".into(),
        allowed_current: 12,
        paused: false,
        reason: "active".into(),
    });
    mgr.save().unwrap();

    let mut mgr2 = PersistenceManager::new(&path);
    mgr2.load().unwrap();
    assert!(mgr2.raised_alerts().ev_emergency);
    assert_eq!(mgr2.state().total_cycles, 1);
    assert_eq!(
        mgr2.state().last_decision.as_ref().map(|d| d.allowed_current),
        Some(12)
    );
}

#[test]
fn missing_file_keeps_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("absent.json").to_string_lossy().to_string();
    let mut mgr = PersistenceManager::new(&path);
    mgr.load().unwrap();
    assert_eq!(mgr.state(), &PersistentState::default());
}

#[test]
fn older_files_without_new_fields_still_load() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        tmp.path(),
        br#"{"raised_alerts":{"ev_emergency":false,"grid_absent_battery_low":true}}"#,
    )
    .unwrap();
    let mut mgr = PersistenceManager::new(&tmp.path().to_string_lossy());
    mgr.load().unwrap();
    assert!(mgr.raised_alerts().grid_absent_battery_low);
    assert_eq!(mgr.state().total_cycles, 0);
}

#[test]
fn corrupt_file_is_an_error() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), b"{not json").unwrap();
    let mut mgr = PersistenceManager::new(&tmp.path().to_string_lossy());
    assert!(mgr.load().is_err());
}
