//! Handlers for reading and publishing channel state over HTTP.
//!
//! These are the request/response counterparts of the WebSocket observer
//! surface: a publish here is fanned out to every attached observer.

use axum::extract::{Path, State};
use axum::Json;
use opswatch_core::channel::{Channel, ChannelSnapshot, HistoryEntry};
use opswatch_core::fpcon::{FpconCondition, FpconLevel, FpconRecord};
use opswatch_core::types::Version;
use opswatch_events::collection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::Caller;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /api/v1/channels/{channel}`.
///
/// With `expectedVersion` set the write only lands if the channel is still
/// at that version; otherwise it fails with 409.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub value: Value,
    #[serde(default)]
    pub expected_version: Option<Version>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub channel: Channel,
    pub version: Version,
}

/// FPCON record plus the full level table for pickers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FpconView {
    #[serde(flatten)]
    pub record: FpconRecord,
    pub levels: Vec<FpconCondition>,
}

/// GET /api/v1/channels/{channel}
pub async fn get_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<DataResponse<ChannelSnapshot>>> {
    let channel = state.hub.resolve(&name).await?;
    let snapshot = state.hub.snapshot(&channel).await;
    Ok(Json(DataResponse { data: snapshot }))
}

/// POST /api/v1/channels/{channel}
///
/// Replace the channel value. Rejected writes leave the channel untouched.
pub async fn publish(
    caller: Caller,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(input): Json<PublishRequest>,
) -> AppResult<Json<DataResponse<PublishResponse>>> {
    let channel = state.hub.resolve(&name).await?;
    let version = state
        .hub
        .publish_versioned(&channel, input.value, input.expected_version, &caller.writer())
        .await?;

    tracing::info!(channel = %channel, version, "Channel published over HTTP");

    Ok(Json(DataResponse {
        data: PublishResponse { channel, version },
    }))
}

/// GET /api/v1/channels/{channel}/history
///
/// Oldest first. Channels without a history return an empty list.
pub async fn get_history(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<DataResponse<Vec<HistoryEntry>>>> {
    let channel = state.hub.resolve(&name).await?;
    let history = state.hub.history(&channel).await;
    Ok(Json(DataResponse { data: history }))
}

/// PUT /api/v1/channels/{channel}/items/{id}
///
/// Insert or replace one item of a list channel, leaving the others as
/// they currently are.
pub async fn upsert_item(
    caller: Caller,
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(item): Json<Value>,
) -> AppResult<Json<DataResponse<PublishResponse>>> {
    let channel = state.hub.resolve(&name).await?;
    let version = collection::upsert_item(&state.hub, &channel, &id, item, &caller.writer()).await?;

    tracing::info!(channel = %channel, item_id = %id, version, "Channel item saved over HTTP");

    Ok(Json(DataResponse {
        data: PublishResponse { channel, version },
    }))
}

/// DELETE /api/v1/channels/{channel}/items/{id}
pub async fn delete_item(
    caller: Caller,
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> AppResult<Json<DataResponse<PublishResponse>>> {
    let channel = state.hub.resolve(&name).await?;
    let version = collection::remove_item(&state.hub, &channel, &id, &caller.writer()).await?;

    tracing::info!(channel = %channel, item_id = %id, version, "Channel item removed over HTTP");

    Ok(Json(DataResponse {
        data: PublishResponse { channel, version },
    }))
}

/// GET /api/v1/fpcon
pub async fn get_fpcon(State(state): State<AppState>) -> AppResult<Json<DataResponse<FpconView>>> {
    let snapshot = state.hub.snapshot(&Channel::Fpcon).await;
    let current: FpconLevel = serde_json::from_value(snapshot.value)
        .map_err(|e| AppError::InternalError(format!("stored FPCON is invalid: {e}")))?;
    let history = snapshot.history.unwrap_or_default();

    Ok(Json(DataResponse {
        data: FpconView {
            record: FpconRecord::from_history(current, &history),
            levels: FpconLevel::ALL.into_iter().map(FpconCondition::from).collect(),
        },
    }))
}
