use super::*;
use crate::engine::PauseReason;
use crate::ha::InMemoryStore;
use serde_json::json;

struct Harness {
    store: Arc<InMemoryStore>,
    controller: WallboxController,
    _dir: tempfile::TempDir,
}

fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.state_file = dir.path().join("state.json").to_string_lossy().to_string();
    config
}

/// Plugged-in car, sunny afternoon, battery in the eco band
async fn sunny_home(store: &InMemoryStore, e: &crate::config::EntitiesConfig) {
    store.insert(&e.voltage, "230").await;
    store.insert(&e.wallbox_state, "charging").await;
    store.insert(&e.current_timestamp, "1760263200").await;
    store.insert(&e.pv_primary_1, "2000").await;
    store.insert(&e.pv_primary_2, "1800").await;
    store.insert(&e.pv_secondary, "600").await;
    store.insert(&e.pv_losses, "100").await;
    store.insert(&e.batt_power, "0").await;
    store.insert(&e.batt_max_discharge, "3000").await;
    store.insert(&e.batt_soc, "85").await;
    store.insert(&e.batt_soc_min, "20").await;
    store.insert(&e.batt_soc_priority, "80").await;
    store.insert(&e.home_power, "1500").await;
    store.insert(&e.home_current, "7").await;
    store.insert(&e.home_max_current, "32").await;
    store.insert(&e.wallbox_power, "0").await;
    store.insert(&e.ev_soc, "55").await;
    store.insert(&e.ev_target_soc, "80").await;
    store.insert(&e.time, "14:30").await;
    store
        .insert_with_attributes(&e.sun, "above_horizon", json!({"elevation": 35.0, "rising": false}))
        .await;
    store.insert(&e.sun_elevation_threshold, "5").await;
    store.insert(&e.min_charge_amps, "6").await;
    store.insert(&e.max_charge_amps, "16").await;
    store.insert(&e.grid_present, "on").await;
    store.insert(&e.last_wallbox_current, "0").await;
    store.insert(&e.batt_protection_cycles, "0").await;
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = Arc::new(InMemoryStore::new());
    sunny_home(&store, &config.entities).await;
    let controller = WallboxController::new(config, store.clone());
    Harness {
        store,
        controller,
        _dir: dir,
    }
}

#[tokio::test]
async fn charges_on_surplus_and_publishes_status() {
    let mut h = harness().await;
    let e = h.controller.config().entities.clone();

    let outcome = h.controller.run_cycle().await;

    // PV 4300 W, domestic 1500 W, excess 2800 W minus 10 % = 2520 W → 10.96 A
    assert_eq!(outcome.decision.allowed_current(), 11);
    assert_eq!(h.store.state_of(&e.wallbox_set_current).await, Some("11".into()));
    assert_eq!(h.store.state_of(&e.wallbox_set_mode).await, Some(MODE_NORMAL.into()));
    assert_eq!(h.store.state_of(&e.last_wallbox_current).await, Some("11".into()));

    let sensor = h.store.entity(&e.status_sensor).await.unwrap();
    assert_eq!(sensor.state, "CHARGING 11A");
    assert_eq!(sensor.attributes["icon"], "mdi:ev-station");
    assert_eq!(sensor.attributes["pause_reason"], "active");

    let status = h.controller.status_receiver().borrow().clone();
    assert_eq!(status.allowed_current, 11);
    assert_eq!(status.total_cycles, 1);
}

#[tokio::test]
async fn stable_input_keeps_current_and_skips_write_back() {
    let mut h = harness().await;
    let e = h.controller.config().entities.clone();

    h.controller.run_cycle().await;
    h.store.clear_calls().await;
    // Slightly more sun: 11.4 A raw, within the hysteresis band
    h.store.insert(&e.pv_primary_1, "2110").await;
    let outcome = h.controller.run_cycle().await;

    assert_eq!(outcome.decision.allowed_current(), 11);
    assert!(outcome.quantized.unwrap().held);
    let helper_writes = h
        .store
        .calls()
        .await
        .into_iter()
        .filter(|c| c.domain == "input_number")
        .count();
    assert_eq!(helper_writes, 0);
}

#[tokio::test]
async fn unplugged_issues_no_charger_command() {
    let mut h = harness().await;
    let e = h.controller.config().entities.clone();
    h.store.insert(&e.wallbox_state, "idle").await;
    h.store.insert(&e.voltage, "0").await;

    let outcome = h.controller.run_cycle().await;

    assert_eq!(outcome.decision.reason(), Some(&PauseReason::ConnectorUnplugged));
    let charger_calls = h
        .store
        .calls()
        .await
        .into_iter()
        .filter(|c| c.domain == "select" || c.domain == "number")
        .count();
    assert_eq!(charger_calls, 0);
    assert_eq!(
        h.store.state_of(&e.status_sensor).await,
        Some("Not connected".into())
    );
}

#[tokio::test]
async fn total_unavailability_pauses_safely() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = Arc::new(InMemoryStore::new());
    let mut controller = WallboxController::new(config.clone(), store.clone());

    let outcome = controller.run_cycle().await;

    assert!(outcome.decision.paused());
    assert_eq!(outcome.decision.reason(), Some(&PauseReason::InvalidVoltage));
    assert_eq!(
        store.state_of(&config.entities.wallbox_set_mode).await,
        Some(MODE_PAUSED.into())
    );
    assert_eq!(
        store.state_of(&config.entities.status_sensor).await,
        Some("PAUSED 0A".into())
    );
}

#[tokio::test]
async fn actuation_failure_does_not_stop_the_cycle() {
    let mut h = harness().await;
    let e = h.controller.config().entities.clone();
    h.store.fail_service("number", "set_value").await;
    h.store.fail_service("select", "select_option").await;

    let outcome = h.controller.run_cycle().await;

    assert_eq!(outcome.decision.allowed_current(), 11);
    let status = h.controller.status_receiver().borrow().clone();
    assert!(!status.actuation.ok());
    assert_eq!(
        h.store.state_of(&e.status_sensor).await,
        Some("CHARGING 11A".into())
    );
}

#[tokio::test]
async fn protection_counter_counts_down_through_the_helper() {
    let mut h = harness().await;
    let e = h.controller.config().entities.clone();
    h.store.insert(&e.batt_protection_cycles, "2").await;

    let first = h.controller.run_cycle().await;
    assert_eq!(
        first.decision.reason(),
        Some(&PauseReason::BatteryProtection { cycles_left: 2 })
    );
    assert_eq!(h.store.state_of(&e.batt_protection_cycles).await, Some("1".into()));

    h.controller.run_cycle().await;
    assert_eq!(h.store.state_of(&e.batt_protection_cycles).await, Some("0".into()));

    let third = h.controller.run_cycle().await;
    assert!(!third.decision.paused());
}

#[tokio::test]
async fn ev_emergency_notification_is_raised_once() {
    let mut h = harness().await;
    let e = h.controller.config().entities.clone();
    h.store.insert(&e.ev_soc, "10").await;
    h.store.insert(&e.ev_emergency_soc, "20").await;

    for _ in 0..3 {
        let outcome = h.controller.run_cycle().await;
        assert!(outcome.decision.allowed_current() >= 6);
    }
    let creates = |calls: Vec<crate::ha::ServiceCall>| {
        calls
            .into_iter()
            .filter(|c| c.domain == "persistent_notification" && c.service == "create")
            .count()
    };
    assert_eq!(creates(h.store.calls().await), 1);
    assert!(h.controller.raised_alerts().ev_emergency);

    h.store.insert(&e.ev_soc, "30").await;
    h.controller.run_cycle().await;
    assert!(!h.controller.raised_alerts().ev_emergency);
    let dismisses = h
        .store
        .calls()
        .await
        .into_iter()
        .filter(|c| c.service == "dismiss")
        .count();
    assert_eq!(dismisses, 1);
}

#[tokio::test]
async fn raised_alerts_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = Arc::new(InMemoryStore::new());
    sunny_home(&store, &config.entities).await;
    store.insert(&config.entities.grid_present, "off").await;
    store.insert(&config.entities.batt_soc, "10").await;

    let mut first = WallboxController::new(config.clone(), store.clone());
    first.run_cycle().await;
    assert!(first.raised_alerts().grid_absent_battery_low);
    drop(first);
    store.clear_calls().await;

    let mut second = WallboxController::new(config, store.clone());
    assert!(second.raised_alerts().grid_absent_battery_low);
    second.run_cycle().await;
    let notification_calls = store
        .calls()
        .await
        .into_iter()
        .filter(|c| c.domain == "persistent_notification")
        .count();
    assert_eq!(notification_calls, 0);
}

#[tokio::test]
async fn status_is_broadcast_as_json() {
    let mut h = harness().await;
    let mut rx = h.controller.subscribe_status();

    h.controller.run_cycle().await;

    let msg = rx.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
    assert_eq!(value["allowed_current"], 11);
    assert_eq!(value["paused"], false);
    assert!(value["cycle_id"].is_string());
}

#[tokio::test]
async fn run_stops_on_shutdown_signal() {
    let mut h = harness().await;
    let shutdown = h.controller.get_shutdown_sender();
    let state_rx = h.controller.state_receiver();
    shutdown.send(()).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), h.controller.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*state_rx.borrow(), DriverState::ShuttingDown);
}

#[tokio::test]
async fn ev_emergency_notification_stays_up_while_unplugged() {
    let mut h = harness().await;
    let e = h.controller.config().entities.clone();
    h.store.insert(&e.ev_soc, "10").await;
    h.store.insert(&e.ev_emergency_soc, "20").await;

    h.controller.run_cycle().await;
    h.store.insert(&e.wallbox_state, "idle").await;
    h.controller.run_cycle().await;
    h.store.insert(&e.wallbox_state, "charging").await;
    h.controller.run_cycle().await;

    let notification_services: Vec<String> = h
        .store
        .calls()
        .await
        .into_iter()
        .filter(|c| c.domain == "persistent_notification")
        .map(|c| c.service)
        .collect();
    assert_eq!(notification_services, ["create"]);
    assert!(h.controller.raised_alerts().ev_emergency);
}

#[tokio::test]
async fn failed_write_back_is_reported_and_retried() {
    let mut h = harness().await;
    let e = h.controller.config().entities.clone();
    h.store.fail_service("input_number", "set_value").await;

    let outcome = h.controller.run_cycle().await;
    assert_eq!(outcome.next.last_applied_current, 11);
    let status = h.controller.status_receiver().borrow().clone();
    assert_eq!(status.stored_prior.last_applied_current, 0);
    assert_eq!(h.store.state_of(&e.last_wallbox_current).await, Some("0".into()));

    // The helper still reads 0, so the next cycle computes the same write again
    let again = h.controller.run_cycle().await;
    assert_eq!(again.next.last_applied_current, 11);
    assert!(!again.quantized.unwrap().held);
}

#[tokio::test]
async fn lost_connection_marks_driver_in_error_until_it_returns() {
    let mut h = harness().await;
    let state_rx = h.controller.state_receiver();

    h.store.set_offline(true);
    h.controller.run_cycle().await;
    assert!(matches!(*state_rx.borrow(), DriverState::Error(_)));
    let status = h.controller.status_receiver().borrow().clone();
    assert_eq!(status.ha_connected, Some(false));

    h.store.set_offline(false);
    h.controller.run_cycle().await;
    assert_eq!(*state_rx.borrow(), DriverState::Running);
}

#[tokio::test]
async fn slow_store_cycle_is_abandoned_at_the_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.poll_interval_ms = 100;
    let store = Arc::new(InMemoryStore::new());
    sunny_home(&store, &config.entities).await;
    store.set_read_latency(std::time::Duration::from_millis(50));
    let mut controller = WallboxController::new(config.clone(), store.clone());
    let state_rx = controller.state_receiver();

    let started = std::time::Instant::now();
    let outcome = controller.run_cycle_with_deadline().await;

    assert!(outcome.is_none());
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
    assert!(matches!(*state_rx.borrow(), DriverState::Error(_)));
    assert!(store.calls().await.is_empty());
    assert_eq!(store.state_of(&config.entities.status_sensor).await, None);
}
