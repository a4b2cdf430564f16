//! Route definitions for the event log.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::events;
use crate::state::AppState;

/// Event log routes mounted at `/events`.
///
/// ```text
/// GET    /      -> list_events
/// POST   /      -> create_event
/// PUT    /{id}  -> update_event
/// DELETE /{id}  -> delete_event
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(events::list_events).post(events::create_event))
        .route("/{id}", put(events::update_event).delete(events::delete_event))
}
