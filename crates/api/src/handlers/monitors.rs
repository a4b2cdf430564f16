//! Handlers for monitoring configuration.
//!
//! Writes here are authorized against the host's `monitor:<serviceId>`
//! channel, so the same tokens that may write channels may configure
//! monitoring.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use opswatch_core::channel::Channel;
use opswatch_core::error::CoreError;
use opswatch_core::monitoring::{MonitorSettings, MonitorSnapshot, MonitoredHost};

use crate::error::AppResult;
use crate::middleware::auth::Caller;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/monitors
pub async fn list_monitors(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<MonitoredHost>>>> {
    Ok(Json(DataResponse {
        data: state.monitors.list().await,
    }))
}

/// GET /api/v1/monitors/{service_id}
///
/// The live readout also published on the host's monitor channel.
pub async fn get_monitor(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> AppResult<Json<DataResponse<MonitorSnapshot>>> {
    let snapshot = state
        .monitors
        .snapshot(&service_id)
        .await
        .ok_or_else(|| CoreError::NotFound {
            entity: "MonitoredHost",
            id: service_id.clone(),
        })?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// PUT /api/v1/monitors/{service_id}
///
/// Create or replace the host's settings. Counts as a manual change, so the
/// host's transition baseline is reset.
pub async fn configure_monitor(
    caller: Caller,
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    Json(settings): Json<MonitorSettings>,
) -> AppResult<Json<DataResponse<MonitoredHost>>> {
    state
        .hub
        .authorize(&caller.writer(), &Channel::monitor(service_id.as_str()))?;

    let host = state.monitors.configure(&service_id, settings).await?;

    tracing::info!(
        service_id = %service_id,
        hostname = %host.hostname,
        is_active = host.is_active,
        "Monitor configured"
    );

    Ok(Json(DataResponse { data: host }))
}

/// DELETE /api/v1/monitors/{service_id}
pub async fn delete_monitor(
    caller: Caller,
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> AppResult<StatusCode> {
    state
        .hub
        .authorize(&caller.writer(), &Channel::monitor(service_id.as_str()))?;

    state.monitors.remove(&service_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
