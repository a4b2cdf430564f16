pub mod channels;
pub mod events;
pub mod health;
pub mod monitors;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /channels/{channel}                  snapshot (GET), publish (POST)
/// /channels/{channel}/history          full history (GET)
/// /channels/{channel}/items/{id}       item upsert (PUT), remove (DELETE)
///
/// /fpcon                               FPCON record view (GET)
///
/// /events                              list (GET), append (POST)
/// /events/{id}                         edit (PUT), delete (DELETE)
///
/// /monitors                            list monitored hosts (GET)
/// /monitors/{service_id}               live readout (GET), configure (PUT), stop (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/channels", channels::router())
        .merge(channels::fpcon_router())
        .nest("/events", events::router())
        .nest("/monitors", monitors::router())
}
