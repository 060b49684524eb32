//! Home Assistant state store access
//!
//! The controller only ever talks to Home Assistant through [`EntityStore`],
//! so the REST client can be swapped for the in-memory store in tests and dry
//! runs.

use crate::error::Result;
use serde_json::Value;

pub mod client;
pub mod memory;
pub mod types;

pub use client::HomeAssistantClient;
pub use memory::InMemoryStore;
pub use types::{EntityState, ServiceCall};

#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    /// Current state of an entity, `None` when it does not exist
    async fn get_state(&self, entity_id: &str) -> Result<Option<EntityState>>;

    /// Call `domain.service` with the given payload
    async fn call_service(&self, domain: &str, service: &str, data: Value) -> Result<()>;

    /// Create or overwrite an entity state (used for the status sensor)
    async fn set_state(&self, entity_id: &str, state: &str, attributes: Value) -> Result<()>;

    /// Optional connection status. Default: unknown (None).
    fn connection_status(&self) -> Option<bool> {
        None
    }
}
