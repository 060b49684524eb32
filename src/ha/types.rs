use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entity state as returned by `GET /api/states/{entity_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl EntityState {
    pub fn new(entity_id: &str, state: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes: Value::Object(serde_json::Map::new()),
            last_updated: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = attributes;
        self
    }

    /// `unavailable` and `unknown` are how HA reports a missing value
    pub fn is_available(&self) -> bool {
        !matches!(self.state.as_str(), "unavailable" | "unknown" | "")
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).filter(|v| !v.is_null())
    }
}

/// One recorded service call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Value,
}

impl ServiceCall {
    pub fn entity_id(&self) -> Option<&str> {
        self.data.get("entity_id").and_then(Value::as_str)
    }
}
