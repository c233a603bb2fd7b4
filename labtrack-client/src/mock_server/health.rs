//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use super::MockState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("labtrack-mock")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Registered accounts, demo included
    pub users: usize,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<MockState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();
    let users = state.users.read().await.len();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "labtrack-mock".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        users,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<MockState> {
    Router::new().route("/health", get(health_check))
}
