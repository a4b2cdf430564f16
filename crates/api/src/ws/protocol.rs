//! JSON frames exchanged with WebSocket observers.
//!
//! Both directions are tagged unions discriminated by `"type"`.

use axum::extract::ws::Message;
use opswatch_core::channel::ChannelSnapshot;
use opswatch_core::event_log::NewEventEntry;
use opswatch_core::types::Version;
use opswatch_events::ChannelUpdate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server to client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Channel state at attach time. Always the first frame.
    Snapshot(ChannelSnapshot),
    /// A write accepted after the snapshot.
    Update(ChannelUpdate),
    /// The sender's own publish was accepted.
    Ack { version: Version },
    /// The sender's last frame was rejected.
    Error { code: String, message: String },
    /// Reply to a client `ping` frame.
    Pong,
}

impl ServerFrame {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn into_message(self) -> Message {
        match serde_json::to_string(&self) {
            Ok(text) => Message::Text(text.into()),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode WebSocket frame");
                Message::Text(
                    r#"{"type":"error","code":"INTERNAL_ERROR","message":"encoding failed"}"#.into(),
                )
            }
        }
    }
}

/// Client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Replace the attached channel's value, optionally only if it is still
    /// at `expectedVersion`.
    Publish {
        value: Value,
        #[serde(default, rename = "expectedVersion")]
        expected_version: Option<Version>,
    },
    /// Add an operator entry to the event log. Only valid on `events`.
    AppendEvent { entry: NewEventEntry },
    /// Application-level keepalive.
    Ping,
}
