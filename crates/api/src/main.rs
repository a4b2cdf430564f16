use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use opswatch_core::event_log::{EventLevel, EventLogEntry};
use opswatch_events::{seed, ChannelPersistence, JsonFileStore, MemoryRecordStore, RecordStore};
use opswatch_monitor::SystemPing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opswatch_api::config::ServerConfig;
use opswatch_api::router::build_app_router;
use opswatch_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "opswatch_api=debug,opswatch_events=debug,opswatch_monitor=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- App state ---
    let state = AppState::new(config.clone(), Arc::new(SystemPing));
    let hub = Arc::clone(&state.hub);

    // --- Channel records ---
    let records: Arc<dyn RecordStore> = match JsonFileStore::open(&config.data_dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(
                error = %e,
                dir = %config.data_dir.display(),
                "Failed to open data directory, channel state will not survive restarts"
            );
            Arc::new(MemoryRecordStore::new())
        }
    };
    let restored = seed(hub.store(), records.as_ref()).await;
    tracing::info!(restored, "Channel records loaded");

    // Spawn channel persistence (saves every dashboard write).
    let persistence_handle = tokio::spawn(ChannelPersistence::run(
        records,
        Arc::clone(hub.store()),
        hub.subscribe(),
    ));

    if let Err(e) = state
        .event_log
        .record_system(EventLogEntry::system(
            EventLevel::Info,
            "System",
            "opswatch online",
            "Server started.",
        ))
        .await
    {
        tracing::warn!(error = %e, "Failed to log startup entry");
    }

    let monitors = Arc::clone(&state.monitors);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop probe loops first so no transition lands mid-shutdown.
    monitors.shutdown().await;
    drop(monitors);
    tracing::info!("Probe loops stopped");

    let observers = hub.close_all().await;
    tracing::info!(observers, "Observers detached");

    // Closing the feed lets persistence drain and exit, even while
    // lingering connection tasks still hold the hub.
    hub.close_feed();
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, persistence_handle).await.is_err() {
        tracing::warn!("Channel persistence did not drain in time");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
