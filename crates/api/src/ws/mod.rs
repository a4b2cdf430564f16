//! WebSocket observer surface.
//!
//! One connection observes one channel: it receives the channel snapshot on
//! connect, then every accepted write, and may publish back over the same
//! socket.

mod handler;
pub mod protocol;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub use handler::ws_handler;

/// `GET /ws/{channel}`, mounted at the root.
pub fn router() -> Router<AppState> {
    Router::new().route("/ws/{channel}", get(ws_handler))
}
