//! Route definitions for monitoring configuration.

use axum::routing::get;
use axum::Router;

use crate::handlers::monitors;
use crate::state::AppState;

/// Monitor routes mounted at `/monitors`.
///
/// ```text
/// GET    /                -> list_monitors
/// GET    /{service_id}    -> get_monitor
/// PUT    /{service_id}    -> configure_monitor
/// DELETE /{service_id}    -> delete_monitor
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(monitors::list_monitors)).route(
        "/{service_id}",
        get(monitors::get_monitor)
            .put(monitors::configure_monitor)
            .delete(monitors::delete_monitor),
    )
}
