//! Force-protection condition (FPCON).
//!
//! A fixed five-level threat posture. Any level may follow any other; every
//! accepted change is kept in the channel history, and the record view below
//! is rebuilt from that history.

use serde::{Deserialize, Serialize};

use crate::channel::HistoryEntry;
use crate::types::Timestamp;

/// The five force-protection conditions, lowest to highest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FpconLevel {
    #[default]
    Normal,
    Alpha,
    Bravo,
    Charlie,
    Delta,
}

impl FpconLevel {
    pub const ALL: [FpconLevel; 5] = [
        FpconLevel::Normal,
        FpconLevel::Alpha,
        FpconLevel::Bravo,
        FpconLevel::Charlie,
        FpconLevel::Delta,
    ];

    /// Stable display id, `"1"` for Normal through `"5"` for Delta.
    pub fn id(self) -> &'static str {
        match self {
            FpconLevel::Normal => "1",
            FpconLevel::Alpha => "2",
            FpconLevel::Bravo => "3",
            FpconLevel::Charlie => "4",
            FpconLevel::Delta => "5",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FpconLevel::Normal => "Normal",
            FpconLevel::Alpha => "Alpha",
            FpconLevel::Bravo => "Bravo",
            FpconLevel::Charlie => "Charlie",
            FpconLevel::Delta => "Delta",
        }
    }

    /// UI colour token for the banner.
    pub fn color(self) -> &'static str {
        match self {
            FpconLevel::Normal => "success",
            FpconLevel::Alpha => "liteWarning",
            FpconLevel::Bravo => "info",
            FpconLevel::Charlie => "warning",
            FpconLevel::Delta => "error",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FpconLevel::Normal => {
                "Applies when a general global threat of possible terrorist activity exists and warrants a routine security posture."
            }
            FpconLevel::Alpha => {
                "Applies when there is an increased general threat of possible terrorist activity against personnel or facilities, the nature and extent of which are unpredictable."
            }
            FpconLevel::Bravo => {
                "Applies when an increased or more predictable threat of terrorist activity exists."
            }
            FpconLevel::Charlie => {
                "Applies when an incident occurs or intelligence is received indicating some form of terrorist action or targeting against personnel or facilities is likely."
            }
            FpconLevel::Delta => {
                "Applies in the immediate area where a terrorist attack has occurred or when intelligence has been received that terrorist action against a specific location or person is imminent."
            }
        }
    }
}

/// A level together with its display metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FpconCondition {
    pub id: &'static str,
    pub name: FpconLevel,
    pub color: &'static str,
    pub description: &'static str,
}

impl From<FpconLevel> for FpconCondition {
    fn from(level: FpconLevel) -> Self {
        Self {
            id: level.id(),
            name: level,
            color: level.color(),
            description: level.description(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FpconHistoryEntry {
    pub fpcon: FpconCondition,
    pub date: Timestamp,
}

/// Current condition plus the ordered change history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FpconRecord {
    pub current_state: FpconCondition,
    pub last_updated: Option<Timestamp>,
    pub history: Vec<FpconHistoryEntry>,
}

impl FpconRecord {
    /// Rebuild the record from the fpcon channel's history (oldest first).
    ///
    /// Entries whose value is not a recognised level are skipped.
    pub fn from_history(current: FpconLevel, history: &[HistoryEntry]) -> Self {
        let history: Vec<FpconHistoryEntry> = history
            .iter()
            .filter_map(|entry| {
                serde_json::from_value::<FpconLevel>(entry.value.clone())
                    .ok()
                    .map(|level| FpconHistoryEntry {
                        fpcon: level.into(),
                        date: entry.recorded_at,
                    })
            })
            .collect();

        Self {
            current_state: current.into(),
            last_updated: history.last().map(|entry| entry.date),
            history,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_follow_severity_order() {
        let ids: Vec<_> = FpconLevel::ALL.iter().map(|l| l.id()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
        assert!(FpconLevel::Delta > FpconLevel::Normal);
    }

    #[test]
    fn serializes_as_plain_name() {
        assert_eq!(serde_json::to_value(FpconLevel::Charlie).unwrap(), json!("Charlie"));
        let parsed: FpconLevel = serde_json::from_value(json!("Alpha")).unwrap();
        assert_eq!(parsed, FpconLevel::Alpha);
    }

    #[test]
    fn record_preserves_history_order() {
        let start = Utc::now();
        let history = vec![
            HistoryEntry { value: json!("Bravo"), recorded_at: start },
            HistoryEntry { value: json!("Charlie"), recorded_at: start + Duration::seconds(1) },
            HistoryEntry { value: json!("Bravo"), recorded_at: start + Duration::seconds(2) },
        ];

        let record = FpconRecord::from_history(FpconLevel::Bravo, &history);

        let names: Vec<_> = record.history.iter().map(|h| h.fpcon.name).collect();
        assert_eq!(names, vec![FpconLevel::Bravo, FpconLevel::Charlie, FpconLevel::Bravo]);
        assert_eq!(record.current_state.name, FpconLevel::Bravo);
        assert_eq!(record.last_updated, Some(start + Duration::seconds(2)));
    }

    #[test]
    fn record_without_history_has_no_last_update() {
        let record = FpconRecord::from_history(FpconLevel::Normal, &[]);
        assert!(record.history.is_empty());
        assert!(record.last_updated.is_none());
        assert_eq!(record.current_state.color, "success");
    }
}
