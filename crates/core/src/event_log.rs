//! Event log entry types.
//!
//! Entries are either written by an operator (`is_user_generated = true`) or
//! emitted by the system, for example when a monitored host changes state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Timestamp;

/// Author recorded on machine-generated entries.
pub const SYSTEM_AUTHOR: &str = "System";

/// Category used for monitoring transitions.
pub const MONITORING_CATEGORY: &str = "Monitoring";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    #[default]
    Info,
    Warning,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    pub id: Uuid,
    #[serde(default)]
    pub level: EventLevel,
    pub category: String,
    #[serde(default)]
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub author: String,
    pub is_user_generated: bool,
    pub observed_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
}

impl EventLogEntry {
    /// A machine-generated entry stamped now.
    pub fn system(
        level: EventLevel,
        category: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            category: category.into(),
            title: title.into(),
            message: message.into(),
            author: SYSTEM_AUTHOR.to_string(),
            is_user_generated: false,
            observed_at: chrono::Utc::now(),
            last_updated: None,
        }
    }

    /// An operator entry built from submitted fields, stamped now.
    pub fn from_user(input: NewEventEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            level: input.level.unwrap_or_default(),
            category: input.category,
            title: input.title.unwrap_or_default(),
            message: input.message,
            author: input.author.unwrap_or_default(),
            is_user_generated: true,
            observed_at: chrono::Utc::now(),
            last_updated: None,
        }
    }

    /// Apply an edit. Timestamps of the original observation are kept.
    pub fn apply(&mut self, patch: EventEntryPatch, at: Timestamp) {
        if let Some(level) = patch.level {
            self.level = level;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(message) = patch.message {
            self.message = message;
        }
        self.last_updated = Some(at);
    }
}

/// Fields an operator submits for a new entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEventEntry {
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub level: Option<EventLevel>,
    #[serde(default)]
    pub author: Option<String>,
}

/// Partial update of an existing entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEntryPatch {
    pub level: Option<EventLevel>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
}
