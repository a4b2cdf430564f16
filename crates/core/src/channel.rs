//! Named state channels.
//!
//! The set of channels is fixed: a handful of dashboard-wide channels plus
//! one `monitor:<serviceId>` status channel per monitored host. Every other
//! name is rejected with [`CoreError::UnknownChannel`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::equipment::EquipmentGroup;
use crate::error::CoreError;
use crate::event_log::EventLogEntry;
use crate::fpcon::FpconLevel;
use crate::types::{Timestamp, Version};

/// Prefix of the per-host monitor status channels.
pub const MONITOR_PREFIX: &str = "monitor:";

/// A named, independently addressable unit of shared state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Channel {
    Scratchpad,
    Fpcon,
    EquipmentGroups,
    PersonnelLocations,
    Events,
    PacePlan,
    Issues,
    /// Live probe readout for one monitored service.
    Monitor(String),
}

impl Channel {
    /// Every dashboard-wide channel. Monitor channels are addressed by
    /// service id and are not listed here.
    pub const FIXED: [Channel; 7] = [
        Channel::Scratchpad,
        Channel::Fpcon,
        Channel::EquipmentGroups,
        Channel::PersonnelLocations,
        Channel::Events,
        Channel::PacePlan,
        Channel::Issues,
    ];

    /// Parse a wire name into a channel.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        match name {
            "scratchpad" => Ok(Channel::Scratchpad),
            "fpcon" => Ok(Channel::Fpcon),
            "equipmentGroups" => Ok(Channel::EquipmentGroups),
            "personnelLocations" => Ok(Channel::PersonnelLocations),
            "events" => Ok(Channel::Events),
            "pacePlan" => Ok(Channel::PacePlan),
            "issues" => Ok(Channel::Issues),
            other => match other.strip_prefix(MONITOR_PREFIX) {
                Some(id) if !id.trim().is_empty() => Ok(Channel::Monitor(id.to_string())),
                _ => Err(CoreError::UnknownChannel(other.to_string())),
            },
        }
    }

    /// Status channel for a monitored service.
    pub fn monitor(service_id: impl Into<String>) -> Self {
        Channel::Monitor(service_id.into())
    }

    /// Whether accepted writes are also appended to the channel's history.
    pub fn tracks_history(&self) -> bool {
        matches!(self, Channel::Fpcon)
    }

    /// Whether the channel's value survives a restart.
    ///
    /// Monitor readouts are rebuilt from fresh probes on every start.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Channel::Monitor(_))
    }

    /// Whether a whole-value publish may replace the channel.
    ///
    /// The event log is capped and only changes entry by entry.
    pub fn accepts_replacement(&self) -> bool {
        !matches!(self, Channel::Events)
    }

    /// Value returned by a read before the first accepted write.
    pub fn default_value(&self) -> Value {
        match self {
            Channel::Scratchpad => Value::String(String::new()),
            Channel::Fpcon => serde_json::to_value(FpconLevel::default()).unwrap_or(Value::Null),
            Channel::EquipmentGroups
            | Channel::PersonnelLocations
            | Channel::Events
            | Channel::Issues => Value::Array(Vec::new()),
            Channel::PacePlan | Channel::Monitor(_) => Value::Object(Default::default()),
        }
    }

    /// Check that `value` has the shape this channel carries.
    pub fn validate(&self, value: &Value) -> Result<(), CoreError> {
        match self {
            Channel::Scratchpad if !value.is_string() => {
                Err(self.shape_error("a text value"))
            }
            Channel::Fpcon => serde_json::from_value::<FpconLevel>(value.clone())
                .map(|_| ())
                .map_err(|_| self.shape_error("one of Normal, Alpha, Bravo, Charlie, Delta")),
            Channel::EquipmentGroups => {
                serde_json::from_value::<Vec<EquipmentGroup>>(value.clone())
                    .map(|_| ())
                    .map_err(|e| CoreError::Validation(format!("equipmentGroups: {e}")))
            }
            Channel::Events => serde_json::from_value::<Vec<EventLogEntry>>(value.clone())
                .map(|_| ())
                .map_err(|e| CoreError::Validation(format!("events: {e}"))),
            Channel::PersonnelLocations | Channel::Issues if !value.is_array() => {
                Err(self.shape_error("a list"))
            }
            Channel::Monitor(_) if !value.is_object() => Err(self.shape_error("an object")),
            _ => Ok(()),
        }
    }

    fn shape_error(&self, expected: &str) -> CoreError {
        CoreError::Validation(format!("{self} expects {expected}"))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Scratchpad => f.write_str("scratchpad"),
            Channel::Fpcon => f.write_str("fpcon"),
            Channel::EquipmentGroups => f.write_str("equipmentGroups"),
            Channel::PersonnelLocations => f.write_str("personnelLocations"),
            Channel::Events => f.write_str("events"),
            Channel::PacePlan => f.write_str("pacePlan"),
            Channel::Issues => f.write_str("issues"),
            Channel::Monitor(id) => write!(f, "{MONITOR_PREFIX}{id}"),
        }
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::parse(s)
    }
}

impl TryFrom<String> for Channel {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Channel::parse(&value)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.to_string()
    }
}

/// One recorded write on a history-tracked channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub value: Value,
    pub recorded_at: Timestamp,
}

/// Point-in-time view of a channel, used for initial render and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub channel: Channel,
    pub version: Version,
    pub value: Value,
    pub updated_at: Option<Timestamp>,
    /// Present only for history-tracked channels, oldest first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
}

impl ChannelSnapshot {
    /// Snapshot of a channel that has never been written.
    pub fn initial(channel: Channel) -> Self {
        let history = channel.tracks_history().then(Vec::new);
        Self {
            value: channel.default_value(),
            channel,
            version: 0,
            updated_at: None,
            history,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_every_fixed_channel_by_its_display_name() {
        for channel in Channel::FIXED {
            let parsed = Channel::parse(&channel.to_string()).expect("fixed channel parses");
            assert_eq!(parsed, channel);
        }
    }

    #[test]
    fn monitor_channels_round_trip_through_their_name() {
        let channel = Channel::parse("monitor:svc-42").unwrap();
        assert_eq!(channel, Channel::monitor("svc-42"));
        assert_eq!(channel.to_string(), "monitor:svc-42");
    }

    #[test]
    fn rejects_unrecognised_names() {
        assert_matches!(Channel::parse("chat"), Err(CoreError::UnknownChannel(n)) if n == "chat");
        assert_matches!(Channel::parse("monitor:"), Err(CoreError::UnknownChannel(_)));
        assert_matches!(Channel::parse("Scratchpad"), Err(CoreError::UnknownChannel(_)));
    }

    #[test]
    fn only_fpcon_tracks_history() {
        let tracked: Vec<_> = Channel::FIXED.iter().filter(|c| c.tracks_history()).collect();
        assert_eq!(tracked, vec![&Channel::Fpcon]);
        assert!(!Channel::monitor("a").tracks_history());
    }

    #[test]
    fn validates_channel_shapes() {
        assert!(Channel::Scratchpad.validate(&json!("notes")).is_ok());
        assert_matches!(
            Channel::Scratchpad.validate(&json!(12)),
            Err(CoreError::Validation(_))
        );
        assert!(Channel::Fpcon.validate(&json!("Charlie")).is_ok());
        assert_matches!(
            Channel::Fpcon.validate(&json!("Echo")),
            Err(CoreError::Validation(_))
        );
        assert!(Channel::PersonnelLocations.validate(&json!([])).is_ok());
        assert_matches!(
            Channel::Issues.validate(&json!({})),
            Err(CoreError::Validation(_))
        );
        assert!(Channel::PacePlan.validate(&json!({"primary": "radio"})).is_ok());
    }

    #[test]
    fn initial_snapshot_carries_defaults() {
        let snap = ChannelSnapshot::initial(Channel::Fpcon);
        assert_eq!(snap.version, 0);
        assert_eq!(snap.value, json!("Normal"));
        assert_eq!(snap.history, Some(Vec::new()));

        let snap = ChannelSnapshot::initial(Channel::Scratchpad);
        assert_eq!(snap.value, json!(""));
        assert!(snap.history.is_none());
    }

    #[test]
    fn serializes_as_wire_name() {
        let value = serde_json::to_value(Channel::EquipmentGroups).unwrap();
        assert_eq!(value, json!("equipmentGroups"));
        let back: Channel = serde_json::from_value(json!("monitor:x")).unwrap();
        assert_eq!(back, Channel::monitor("x"));
    }
}
