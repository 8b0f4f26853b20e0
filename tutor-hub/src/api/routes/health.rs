//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::api::server::AppState;

/// Health of one component.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
}

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
}

/// Health check endpoint.
///
/// Reports `degraded` while the OA token cannot be used or renewed; message
/// delivery keeps running on the last known token in that state.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let info = state.tokens.get_token_info();

    let (token_status, message) = if let Some(error) = info.last_refresh_error {
        ("degraded", Some(format!("Last refresh failed: {}", error)))
    } else if info.initialized && !info.has_access_token && !info.has_refresh_token {
        ("degraded", Some("No access or refresh token configured".to_string()))
    } else {
        ("healthy", None)
    };

    Json(HealthResponse {
        status: token_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        components: vec![ComponentHealth {
            name: "zalo_token".to_string(),
            status: token_status.to_string(),
            message,
        }],
    })
}

/// Liveness check - is the service alive?
async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "uptime_secs": uptime
        })),
    )
}
