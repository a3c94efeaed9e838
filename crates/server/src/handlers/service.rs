//! Service discovery and health endpoints.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health - Health check endpoint.
///
/// Fails when either backend is unreachable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;
    state.storage.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Public server limits, used by clients to validate requests up front.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    /// Largest accepted file, in bytes.
    pub max_file_size: u64,
    /// Largest ttl a client may request, in seconds (0 = unlimited).
    pub max_ttl: i64,
    /// Ttl applied when none is requested.
    pub default_ttl: i64,
    /// Whether uploads may be protected by a one-time token.
    pub token_protection: bool,
}

/// GET /config
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let server = &state.config.server;
    Json(ConfigResponse {
        max_file_size: server.max_file_size,
        max_ttl: server.max_ttl_secs,
        default_ttl: server.default_ttl_secs,
        token_protection: state.validator.is_enabled(),
    })
}
