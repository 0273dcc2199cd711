//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::state::AppState;
use crate::admission::POLICY_VERSION;

/// Health check response data
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "development")]
    pub mode: String,
    /// Version of the admission policy table in force
    pub policy_version: u32,
    pub version: String,
    pub git_hash: String,
}

/// Health check endpoint
///
/// - Healthy: 200 OK + `{status: "ok", ...}`
/// - Credential store unreachable: 503 + `{status: "unavailable", ...}`
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Credential store unavailable", body = HealthResponse)
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (status_code, status) = match state.store.health().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!("[HEALTH] Credential store check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            mode: state.mode.as_str().to_string(),
            policy_version: POLICY_VERSION,
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_hash: env!("GIT_HASH").to_string(),
        }),
    )
}
