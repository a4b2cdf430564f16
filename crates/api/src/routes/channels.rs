//! Route definitions for channel state.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::channels;
use crate::state::AppState;

/// Channel routes mounted at `/channels`.
///
/// ```text
/// GET    /{channel}             -> get_channel
/// POST   /{channel}             -> publish
/// GET    /{channel}/history     -> get_history
/// PUT    /{channel}/items/{id}  -> upsert_item
/// DELETE /{channel}/items/{id}  -> delete_item
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{channel}", get(channels::get_channel).post(channels::publish))
        .route("/{channel}/history", get(channels::get_history))
        .route(
            "/{channel}/items/{id}",
            put(channels::upsert_item).delete(channels::delete_item),
        )
}

/// `GET /fpcon -> get_fpcon`
pub fn fpcon_router() -> Router<AppState> {
    Router::new().route("/fpcon", get(channels::get_fpcon))
}
