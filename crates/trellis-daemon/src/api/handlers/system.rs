//! System handlers.

use crate::api::state::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

/// Health response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
}

/// Liveness probe.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}
