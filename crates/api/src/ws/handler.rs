use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use opswatch_core::channel::Channel;
use opswatch_core::error::CoreError;
use opswatch_core::event_log::EventLogEntry;
use opswatch_events::{ObserverId, Principal, Writer};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};

use crate::error::{AppError, AppResult};
use crate::handlers::events::validate_new_entry;
use crate::middleware::auth::Caller;
use crate::state::AppState;
use crate::ws::protocol::{ClientFrame, ServerFrame};

/// Query string of the upgrade request. Browsers cannot set headers on a
/// WebSocket handshake, so the bearer token may come here instead.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /ws/{channel}
///
/// Rejects unknown channels, including monitor channels of services that
/// are not monitored, before upgrading. After the upgrade the
/// connection is attached to the channel as an observer and managed by a
/// sender task plus the receive loop below.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<WsParams>,
    caller: Caller,
    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    let channel = state.hub.resolve(&name).await?;
    let principal = match params.token.as_deref() {
        Some(token) => Principal::from_token(Some(token)),
        None => caller.0,
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, channel, principal)))
}

/// Manage one observer connection.
///
///   1. Attach to the channel and send the snapshot as the first frame.
///   2. Spawn a sender task forwarding hub updates, direct replies and
///      heartbeat pings to the socket.
///   3. Process inbound frames on the current task.
///   4. Detach on disconnect.
///
/// When the hub drops the observer (shutdown) the sender task sends a Close
/// frame and stops.
async fn handle_socket(socket: WebSocket, state: AppState, channel: Channel, principal: Principal) {
    let observer = match state.hub.attach(&channel).await {
        Ok(observer) => observer,
        Err(e) => {
            // The channel closed between the handshake and the upgrade.
            tracing::debug!(channel = %channel, error = %e, "WebSocket attach refused");
            let (mut sink, _) = socket.split();
            let _ = sink.send(ServerFrame::error("UNKNOWN_CHANNEL", e.to_string()).into_message()).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };
    let observer_id = observer.id;
    let mut updates = observer.updates;
    let snapshot = observer.snapshot;
    tracing::info!(observer_id, channel = %channel, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Message>();
    let heartbeat = Duration::from_secs(state.config.heartbeat_interval_secs);

    let send_task = tokio::spawn(async move {
        if sink
            .send(ServerFrame::Snapshot(snapshot).into_message())
            .await
            .is_err()
        {
            return;
        }

        let mut ping = interval_at(Instant::now() + heartbeat, heartbeat);
        loop {
            let msg = tokio::select! {
                update = updates.recv() => match update {
                    Some(update) => ServerFrame::Update((*update).clone()).into_message(),
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                },
                Some(reply) = reply_rx.recv() => reply,
                _ = ping.tick() => Message::Ping(Bytes::new()),
            };
            if sink.send(msg).await.is_err() {
                tracing::debug!(observer_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply = handle_frame(&state, &channel, &principal, observer_id, text.as_str()).await;
                let _ = reply_tx.send(reply.into_message());
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(observer_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(observer_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.hub.detach(observer_id).await;
    send_task.abort();
    tracing::info!(observer_id, channel = %channel, "WebSocket disconnected");
}

/// Apply one client frame and build the reply.
async fn handle_frame(
    state: &AppState,
    channel: &Channel,
    principal: &Principal,
    observer_id: ObserverId,
    text: &str,
) -> ServerFrame {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => return ServerFrame::error("BAD_REQUEST", format!("Malformed frame: {e}")),
    };

    let writer = Writer::new(principal.clone()).via(observer_id);
    let result = match frame {
        ClientFrame::Ping => return ServerFrame::Pong,
        ClientFrame::Publish {
            value,
            expected_version,
        } => {
            state
                .hub
                .publish_versioned(channel, value, expected_version, &writer)
                .await
        }
        ClientFrame::AppendEvent { entry } => {
            if *channel != Channel::Events {
                Err(CoreError::Validation(
                    "appendEvent is only accepted on the events channel".into(),
                ))
            } else {
                match validate_new_entry(&entry) {
                    Ok(()) => {
                        state
                            .event_log
                            .append(EventLogEntry::from_user(entry), &writer)
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
        }
    };

    match result {
        Ok(version) => ServerFrame::Ack { version },
        Err(e) => {
            tracing::debug!(observer_id, channel = %channel, error = %e, "Observer write rejected");
            let (_, code, message) = AppError::Core(e).parts();
            ServerFrame::error(code, message)
        }
    }
}
