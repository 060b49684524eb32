//! Status API: read-only views of the controller and a live SSE feed

use crate::config::Config;
use crate::driver::{ControllerStatus, DriverState};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub status_rx: watch::Receiver<Arc<ControllerStatus>>,
    pub status_tx: broadcast::Sender<String>,
    pub state_rx: watch::Receiver<DriverState>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn from_controller(controller: &crate::driver::WallboxController) -> Self {
        Self {
            status_rx: controller.status_receiver(),
            status_tx: controller.status_broadcaster(),
            state_rx: controller.state_receiver(),
            config: Arc::new(controller.config().clone()),
        }
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.state_rx.borrow().clone();
    match current {
        DriverState::Error(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "error", "error": e})),
        ),
        other => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok", "driver_state": other.label()})),
        ),
    }
}

pub(crate) async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.status_rx.borrow().clone();
    Json(snapshot.as_ref().clone())
}

pub(crate) async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    // The access token is never serialized
    let json = serde_json::to_value(state.config.as_ref())
        .unwrap_or(serde_json::json!({"error": "serialization"}));
    Json(json)
}

#[cfg(feature = "schema")]
pub(crate) async fn get_config_schema() -> impl IntoResponse {
    let schema = schemars::schema_for!(crate::config::Config);
    Json(serde_json::to_value(&schema).unwrap_or(serde_json::json!({"error": "schema"})))
}

pub(crate) async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.status_tx.subscribe();
    // Lagged receivers skip what they missed; the next cycle brings them current
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok::<Event, std::convert::Infallible>(
            Event::default().event("status").data(payload),
        )),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/config", get(get_config))
        .route("/api/events", get(events));

    #[cfg(feature = "schema")]
    let router = router.route("/api/config/schema", get(get_config_schema));

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let router = build_router(state);
    let logger = crate::logging::get_logger("web");

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Status API listening at http://{}:{}/api",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router).await?;
    Ok(())
}
