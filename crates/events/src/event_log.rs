//! Operational event log kept on the `events` channel.
//!
//! The log is stored most-recent-first as the `events` channel value, so
//! attaching to the channel yields the whole log and every append reaches
//! observers through the hub like any other write. The log is capped; the
//! oldest entries fall off the end. Entries are never deduplicated.

use std::sync::Arc;

use chrono::Utc;
use opswatch_core::channel::Channel;
use opswatch_core::error::CoreError;
use opswatch_core::event_log::{EventEntryPatch, EventLogEntry};
use opswatch_core::types::Version;
use serde_json::Value;
use uuid::Uuid;

use crate::hub::{BroadcastHub, Writer};

/// Default number of entries retained.
pub const DEFAULT_CAPACITY: usize = 500;

pub struct EventLog {
    hub: Arc<BroadcastHub>,
    capacity: usize,
}

impl EventLog {
    pub fn new(hub: Arc<BroadcastHub>, capacity: usize) -> Self {
        Self {
            hub,
            capacity: capacity.max(1),
        }
    }

    /// Add an entry at the head of the log and return the `events`
    /// channel version that carries it.
    pub async fn append(&self, entry: EventLogEntry, writer: &Writer) -> Result<Version, CoreError> {
        let capacity = self.capacity;
        let entry_id = entry.id;
        let user_generated = entry.is_user_generated;
        let version = self
            .hub
            .modify(&Channel::Events, writer, move |current| {
                let mut entries = decode(current)?;
                entries.insert(0, entry);
                entries.truncate(capacity);
                encode(&entries).map(Some)
            })
            .await?
            .ok_or_else(|| CoreError::Internal("event log append was dropped".into()))?;

        tracing::debug!(
            entry_id = %entry_id,
            user_generated,
            version,
            "Event log entry appended"
        );
        Ok(version)
    }

    /// Append a machine-generated entry.
    pub async fn record_system(&self, entry: EventLogEntry) -> Result<Version, CoreError> {
        self.append(entry, &Writer::system()).await
    }

    /// All retained entries, most recent first.
    pub async fn list(&self) -> Result<Vec<EventLogEntry>, CoreError> {
        decode(&self.hub.snapshot(&Channel::Events).await.value)
    }

    /// Edit an entry in place. Its position in the log does not change.
    pub async fn update(
        &self,
        id: Uuid,
        patch: EventEntryPatch,
        writer: &Writer,
    ) -> Result<EventLogEntry, CoreError> {
        let mut updated = None;
        self.hub
            .modify(&Channel::Events, writer, |current| {
                let mut entries = decode(current)?;
                let entry = entries
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or_else(|| not_found(id))?;
                entry.apply(patch, Utc::now());
                updated = Some(entry.clone());
                encode(&entries).map(Some)
            })
            .await?;
        updated.ok_or_else(|| not_found(id))
    }

    pub async fn remove(&self, id: Uuid, writer: &Writer) -> Result<(), CoreError> {
        self.hub
            .modify(&Channel::Events, writer, |current| {
                let mut entries = decode(current)?;
                let before = entries.len();
                entries.retain(|e| e.id != id);
                if entries.len() == before {
                    return Err(not_found(id));
                }
                encode(&entries).map(Some)
            })
            .await?;
        Ok(())
    }
}

fn decode(value: &Value) -> Result<Vec<EventLogEntry>, CoreError> {
    serde_json::from_value(value.clone())
        .map_err(|e| CoreError::Internal(format!("corrupt event log: {e}")))
}

fn encode(entries: &[EventLogEntry]) -> Result<Value, CoreError> {
    serde_json::to_value(entries).map_err(|e| CoreError::Internal(e.to_string()))
}

fn not_found(id: Uuid) -> CoreError {
    CoreError::NotFound {
        entity: "EventLogEntry",
        id: id.to_string(),
    }
}
