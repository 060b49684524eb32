use super::EntityStore;
use super::types::EntityState;
use crate::config::HomeAssistantConfig;
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

const CONNECTION_UNKNOWN: u8 = 0;
const CONNECTION_UP: u8 = 1;
const CONNECTION_DOWN: u8 = 2;

/// Home Assistant REST API client
#[derive(Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
    connection: Arc<AtomicU8>,
    warned_missing_token: Arc<AtomicBool>,
    logger: StructuredLogger,
}

impl HomeAssistantClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, token, Duration::from_secs(10))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HeliosError::config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            connection: Arc::new(AtomicU8::new(CONNECTION_UNKNOWN)),
            warned_missing_token: Arc::new(AtomicBool::new(false)),
            logger: get_logger("ha_client"),
        })
    }

    pub fn from_config(config: &HomeAssistantConfig) -> Result<Self> {
        let client = Self::with_timeout(
            config.base_url.clone(),
            config.token.clone(),
            Duration::from_millis(config.timeout_ms.max(1)),
        )?;
        client.logger.info(&format!(
            "Home Assistant client initialized: {}",
            client.base_url
        ));
        Ok(client.with_retry_config(
            config.max_retries.max(1),
            Duration::from_millis(config.retry_delay_ms),
        ))
    }

    /// Set custom retry configuration
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            if !self.warned_missing_token.swap(true, Ordering::Relaxed) {
                self.logger
                    .warn("No Home Assistant token configured, requests are sent unauthenticated");
            }
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }

    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> Result<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => {
                    self.connection.store(CONNECTION_UP, Ordering::Relaxed);
                    return Ok(response);
                }
                Err(e) if attempts >= self.max_retries => {
                    self.connection.store(CONNECTION_DOWN, Ordering::Relaxed);
                    self.logger
                        .error(&format!("Request failed after {} attempts: {}", attempts, e));
                    return Err(e.into());
                }
                Err(e) => {
                    self.logger.warn(&format!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    ));
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    async fn error_for(response: reqwest::Response, what: &str) -> HeliosError {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return HeliosError::auth(format!("{} rejected with status {}", what, status));
        }
        let body = response.text().await.unwrap_or_default();
        HeliosError::home_assistant(format!("{} failed with status {}: {}", what, status, body))
    }
}

#[async_trait::async_trait]
impl EntityStore for HomeAssistantClient {
    async fn get_state(&self, entity_id: &str) -> Result<Option<EntityState>> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        self.logger.trace(&format!("GET {}", url));

        let response = self
            .retry_request(|| async { self.authorized(self.client.get(&url)).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let state = response.json::<EntityState>().await?;
                self.logger
                    .trace(&format!("{} = '{}'", state.entity_id, state.state));
                Ok(Some(state))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::error_for(response, &format!("GET state of {}", entity_id)).await),
        }
    }

    async fn call_service(&self, domain: &str, service: &str, data: Value) -> Result<()> {
        if domain.is_empty() || service.is_empty() {
            return Err(HeliosError::validation(
                "service",
                "Domain and service must not be empty",
            ));
        }
        let url = format!("{}/api/services/{}/{}", self.base_url, domain, service);
        self.logger
            .debug(&format!("Calling {}.{} with {}", domain, service, data));

        let response = self
            .retry_request(|| async {
                self.authorized(self.client.post(&url))
                    .json(&data)
                    .send()
                    .await
            })
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_for(response, &format!("Service {}.{}", domain, service)).await)
        }
    }

    async fn set_state(&self, entity_id: &str, state: &str, attributes: Value) -> Result<()> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        let body = json!({ "state": state, "attributes": attributes });

        let response = self
            .retry_request(|| async {
                self.authorized(self.client.post(&url))
                    .json(&body)
                    .send()
                    .await
            })
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_for(response, &format!("POST state of {}", entity_id)).await)
        }
    }

    fn connection_status(&self) -> Option<bool> {
        match self.connection.load(Ordering::Relaxed) {
            CONNECTION_UP => Some(true),
            CONNECTION_DOWN => Some(false),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_get_state_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/states/sun.sun")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "entity_id": "sun.sun",
                    "state": "above_horizon",
                    "attributes": {"elevation": 23.4, "rising": true},
                    "last_changed": "2025-10-02T10:00:00Z",
                    "last_updated": "2025-10-02T10:00:00Z"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let state = client.get_state("sun.sun").await.unwrap().unwrap();

        assert_eq!(state.state, "above_horizon");
        assert_eq!(state.attribute("elevation"), Some(&json!(23.4)));
        assert_eq!(client.connection_status(), Some(true));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_state_not_found_is_none() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/states/sensor.nonexistent")
            .with_status(404)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client.get_state("sensor.nonexistent").await.unwrap();

        assert!(result.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states/sensor.x")
            .with_status(401)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "bad").unwrap();
        let result = client.get_state("sensor.x").await;
        assert!(matches!(result, Err(HeliosError::Auth { .. })));
    }

    #[tokio::test]
    async fn test_call_service_posts_payload() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/number/set_value")
            .match_header("authorization", "Bearer test_token")
            .match_body(Matcher::Json(json!({
                "entity_id": "number.wallbox_set_max_current",
                "value": 10
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(format!("{}/", server.url()), "test_token").unwrap();
        client
            .call_service(
                "number",
                "set_value",
                json!({"entity_id": "number.wallbox_set_max_current", "value": 10}),
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_service_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/services/select/select_option")
            .with_status(400)
            .with_body("bad option")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let err = client
            .call_service("select", "select_option", json!({"option": "warp"}))
            .await
            .unwrap_err();
        assert!(matches!(err, HeliosError::HomeAssistant { .. }));
        assert!(err.to_string().contains("bad option"));
    }

    #[tokio::test]
    async fn test_set_state_publishes_sensor() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/states/sensor.wallbox_status")
            .match_body(Matcher::PartialJson(json!({"state": "CHARGING 10A"})))
            .with_status(201)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        client
            .set_state("sensor.wallbox_status", "CHARGING 10A", json!({"icon": "mdi:ev-station"}))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_error_after_retries() {
        let client = HomeAssistantClient::with_timeout(
            "http://127.0.0.1:1",
            "t",
            Duration::from_millis(200),
        )
        .unwrap()
        .with_retry_config(2, Duration::from_millis(1));
        let result = client.get_state("sensor.any").await;
        assert!(matches!(result, Err(HeliosError::Network { .. })));
        assert_eq!(client.connection_status(), Some(false));
    }
}
