use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Attached observers across all channels.
    pub observers: usize,
    /// Registered monitored hosts.
    pub monitors: usize,
    /// Hosts with a live probe loop.
    pub probing: usize,
}

/// GET /health -- returns service status and hub introspection.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        observers: state.hub.connection_count().await,
        monitors: state.monitors.host_count().await,
        probing: state.monitors.probing_count().await,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
