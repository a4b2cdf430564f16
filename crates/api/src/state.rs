use std::sync::Arc;

use opswatch_events::{
    AllowAll, BroadcastHub, ChannelStore, EventLog, TokenAuthorizer, WriteAuthorizer,
};
use opswatch_monitor::{MonitorService, Prober};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Channel store, observer registry and fan-out.
    pub hub: Arc<BroadcastHub>,
    /// Operational event log kept on the `events` channel.
    pub event_log: Arc<EventLog>,
    /// Probe scheduling and status transitions.
    pub monitors: Arc<MonitorService>,
}

impl AppState {
    /// Wire up the hub, event log and monitoring with the given prober.
    pub fn new(config: ServerConfig, prober: Arc<dyn Prober>) -> Self {
        let store = Arc::new(ChannelStore::new(config.history_capacity));
        let hub = Arc::new(BroadcastHub::new(store, authorizer_for(&config)));
        let event_log = Arc::new(EventLog::new(Arc::clone(&hub), config.event_log_capacity));
        let monitors = Arc::new(MonitorService::new(
            Arc::clone(&hub),
            Arc::clone(&event_log),
            prober,
        ));

        Self {
            config: Arc::new(config),
            hub,
            event_log,
            monitors,
        }
    }
}

/// Token check when `WRITE_TOKENS` is set, otherwise open writes.
fn authorizer_for(config: &ServerConfig) -> Arc<dyn WriteAuthorizer> {
    if config.write_tokens.is_empty() {
        tracing::warn!("WRITE_TOKENS is empty, every caller may write");
        Arc::new(AllowAll)
    } else {
        Arc::new(TokenAuthorizer::new(config.write_tokens.iter().cloned()))
    }
}
