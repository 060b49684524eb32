use super::EntityStore;
use super::types::{EntityState, ServiceCall};
use crate::error::{HeliosError, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// In-process entity store.
///
/// Service calls are recorded and the common setter services are applied to
/// the stored states, so several control cycles can run against it like a
/// small simulated home.
#[derive(Default)]
pub struct InMemoryStore {
    states: Mutex<HashMap<String, EntityState>>,
    calls: Mutex<Vec<ServiceCall>>,
    failing_services: Mutex<HashSet<String>>,
    offline: AtomicBool,
    /// Delay added to every read, in milliseconds
    read_latency_ms: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, entity_id: &str, state: &str) {
        self.insert_state(EntityState::new(entity_id, state)).await;
    }

    pub async fn insert_with_attributes(&self, entity_id: &str, state: &str, attributes: Value) {
        self.insert_state(EntityState::new(entity_id, state).with_attributes(attributes))
            .await;
    }

    pub async fn insert_state(&self, state: EntityState) {
        self.states
            .lock()
            .await
            .insert(state.entity_id.clone(), state);
    }

    pub async fn remove(&self, entity_id: &str) {
        self.states.lock().await.remove(entity_id);
    }

    pub async fn state_of(&self, entity_id: &str) -> Option<String> {
        self.states
            .lock()
            .await
            .get(entity_id)
            .map(|s| s.state.clone())
    }

    pub async fn entity(&self, entity_id: &str) -> Option<EntityState> {
        self.states.lock().await.get(entity_id).cloned()
    }

    pub async fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    /// Report the connection as lost (or restored)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Slow every read down, as a sluggish Home Assistant would
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Make `domain.service` fail from now on
    pub async fn fail_service(&self, domain: &str, service: &str) {
        self.failing_services
            .lock()
            .await
            .insert(format!("{}.{}", domain, service));
    }

    async fn apply(&self, domain: &str, service: &str, data: &Value) {
        let Some(entity_id) = data.get("entity_id").and_then(Value::as_str) else {
            return;
        };
        let new_state = match (domain, service) {
            ("number" | "input_number", "set_value") => data.get("value").map(value_text),
            ("select" | "input_select", "select_option") => data.get("option").map(value_text),
            ("input_boolean", "turn_on") => Some("on".to_string()),
            ("input_boolean", "turn_off") => Some("off".to_string()),
            _ => None,
        };
        if let Some(new_state) = new_state {
            let mut states = self.states.lock().await;
            states
                .entry(entity_id.to_string())
                .and_modify(|s| s.state = new_state.clone())
                .or_insert_with(|| EntityState::new(entity_id, &new_state));
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait::async_trait]
impl EntityStore for InMemoryStore {
    async fn get_state(&self, entity_id: &str) -> Result<Option<EntityState>> {
        let latency = self.read_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        Ok(self.states.lock().await.get(entity_id).cloned())
    }

    async fn call_service(&self, domain: &str, service: &str, data: Value) -> Result<()> {
        let key = format!("{}.{}", domain, service);
        if self.failing_services.lock().await.contains(&key) {
            return Err(HeliosError::home_assistant(format!(
                "Service {} unavailable",
                key
            )));
        }
        self.apply(domain, service, &data).await;
        self.calls.lock().await.push(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        });
        Ok(())
    }

    async fn set_state(&self, entity_id: &str, state: &str, attributes: Value) -> Result<()> {
        self.insert_state(EntityState::new(entity_id, state).with_attributes(attributes))
            .await;
        Ok(())
    }

    fn connection_status(&self) -> Option<bool> {
        Some(!self.offline.load(Ordering::Relaxed))
    }
}
