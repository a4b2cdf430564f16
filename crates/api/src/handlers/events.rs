//! Handlers for the operational event log.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use opswatch_core::error::CoreError;
use opswatch_core::event_log::{EventEntryPatch, EventLogEntry, NewEventEntry};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::Caller;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/events
///
/// Most recent first.
pub async fn list_events(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<EventLogEntry>>>> {
    let entries = state.event_log.list().await?;
    Ok(Json(DataResponse { data: entries }))
}

/// POST /api/v1/events
pub async fn create_event(
    caller: Caller,
    State(state): State<AppState>,
    Json(input): Json<NewEventEntry>,
) -> AppResult<impl IntoResponse> {
    validate_new_entry(&input)?;
    let entry = EventLogEntry::from_user(input);
    state.event_log.append(entry.clone(), &caller.writer()).await?;

    tracing::info!(entry_id = %entry.id, category = %entry.category, "Event log entry created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: entry })))
}

/// PUT /api/v1/events/{id}
pub async fn update_event(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<EventEntryPatch>,
) -> AppResult<Json<DataResponse<EventLogEntry>>> {
    let entry = state.event_log.update(id, patch, &caller.writer()).await?;
    Ok(Json(DataResponse { data: entry }))
}

/// DELETE /api/v1/events/{id}
pub async fn delete_event(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.event_log.remove(id, &caller.writer()).await?;
    tracing::info!(entry_id = %id, "Event log entry deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn validate_new_entry(input: &NewEventEntry) -> Result<(), CoreError> {
    if input.category.trim().is_empty() {
        return Err(CoreError::Validation("category must not be empty".into()));
    }
    if input.message.trim().is_empty() {
        return Err(CoreError::Validation("message must not be empty".into()));
    }
    Ok(())
}
