//! Versioned per-channel state.
//!
//! [`ChannelStore`] is the single source of truth for every channel's
//! current value. Each channel lives in its own slot behind its own lock,
//! so writes to one channel are serialized while different channels never
//! contend. A write replaces the value, bumps the version, and (for
//! history-tracked channels) appends to the history in one critical
//! section, so readers never see a half-applied write.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use opswatch_core::channel::{Channel, ChannelSnapshot, HistoryEntry};
use opswatch_core::error::CoreError;
use opswatch_core::types::{Timestamp, Version};
use serde_json::Value;
use tokio::sync::RwLock;

/// Default bound on history-tracked channels.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

struct Slot {
    value: Value,
    version: Version,
    updated_at: Option<Timestamp>,
    history: VecDeque<HistoryEntry>,
}

impl Slot {
    fn new(channel: &Channel) -> Self {
        Self {
            value: channel.default_value(),
            version: 0,
            updated_at: None,
            history: VecDeque::new(),
        }
    }

    fn snapshot(&self, channel: &Channel) -> ChannelSnapshot {
        ChannelSnapshot {
            channel: channel.clone(),
            version: self.version,
            value: self.value.clone(),
            updated_at: self.updated_at,
            history: channel
                .tracks_history()
                .then(|| self.history.iter().cloned().collect()),
        }
    }

    /// Replace the value. Timestamps are clamped so they never go backwards.
    fn commit(&mut self, value: Value, at: Timestamp, track: bool, capacity: usize) -> Version {
        let at = self.updated_at.map_or(at, |last| last.max(at));
        if track {
            if self.history.len() >= capacity {
                self.history.pop_front();
            }
            self.history.push_back(HistoryEntry {
                value: value.clone(),
                recorded_at: at,
            });
        }
        self.value = value;
        self.updated_at = Some(at);
        self.version += 1;
        self.version
    }
}

/// In-memory channel state holder.
///
/// Designed to be shared via `Arc<ChannelStore>`.
pub struct ChannelStore {
    slots: RwLock<HashMap<Channel, Arc<RwLock<Slot>>>>,
    history_capacity: usize,
}

impl ChannelStore {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            history_capacity: history_capacity.max(1),
        }
    }

    /// Current snapshot of `channel`, or its defaults if never written.
    pub async fn read(&self, channel: &Channel) -> ChannelSnapshot {
        let slot = self.slots.read().await.get(channel).cloned();
        match slot {
            Some(slot) => slot.read().await.snapshot(channel),
            None => ChannelSnapshot::initial(channel.clone()),
        }
    }

    /// Replace the channel's value and return the new version.
    ///
    /// On history-tracked channels the value is also appended to the
    /// history, under the same lock.
    pub async fn write(&self, channel: &Channel, value: Value, at: Timestamp) -> Version {
        let slot = self.slot(channel).await;
        let mut slot = slot.write().await;
        slot.commit(value, at, channel.tracks_history(), self.history_capacity)
    }

    /// Record a change on a history-tracked channel.
    ///
    /// The value becomes current and is appended to the history, so the
    /// latest history entry always equals the current value.
    pub async fn append_history(
        &self,
        channel: &Channel,
        value: Value,
        at: Timestamp,
    ) -> Result<Version, CoreError> {
        if !channel.tracks_history() {
            return Err(CoreError::Validation(format!(
                "{channel} does not keep a history"
            )));
        }
        Ok(self.write(channel, value, at).await)
    }

    /// Full history of `channel`, oldest first. Empty for untracked channels.
    pub async fn history(&self, channel: &Channel) -> Vec<HistoryEntry> {
        let slot = self.slots.read().await.get(channel).cloned();
        match slot {
            Some(slot) => slot.read().await.history.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn version(&self, channel: &Channel) -> Version {
        let slot = self.slots.read().await.get(channel).cloned();
        match slot {
            Some(slot) => slot.read().await.version,
            None => 0,
        }
    }

    /// Load a previously persisted snapshot, replacing the channel's state.
    pub async fn restore(&self, snapshot: ChannelSnapshot) {
        let slot = self.slot(&snapshot.channel).await;
        let mut slot = slot.write().await;
        let mut history: VecDeque<HistoryEntry> = snapshot.history.unwrap_or_default().into();
        while history.len() > self.history_capacity {
            history.pop_front();
        }
        slot.value = snapshot.value;
        slot.version = snapshot.version;
        slot.updated_at = snapshot.updated_at;
        slot.history = history;
    }

    /// Drop one channel back to its defaults.
    pub async fn remove(&self, channel: &Channel) {
        self.slots.write().await.remove(channel);
    }

    /// Drop every channel back to its defaults.
    pub async fn reset(&self) {
        self.slots.write().await.clear();
    }

    async fn slot(&self, channel: &Channel) -> Arc<RwLock<Slot>> {
        if let Some(slot) = self.slots.read().await.get(channel) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(
            slots
                .entry(channel.clone())
                .or_insert_with(|| Arc::new(RwLock::new(Slot::new(channel)))),
        )
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn unread_channel_returns_default() {
        let store = ChannelStore::default();
        let snap = store.read(&Channel::Scratchpad).await;
        assert_eq!(snap.version, 0);
        assert_eq!(snap.value, json!(""));
    }

    #[tokio::test]
    async fn versions_increase_per_channel() {
        let store = ChannelStore::default();
        let now = Utc::now();
        assert_eq!(store.write(&Channel::Scratchpad, json!("a"), now).await, 1);
        assert_eq!(store.write(&Channel::Scratchpad, json!("b"), now).await, 2);
        assert_eq!(store.write(&Channel::Issues, json!([]), now).await, 1);

        let snap = store.read(&Channel::Scratchpad).await;
        assert_eq!(snap.value, json!("b"));
        assert_eq!(snap.version, 2);
    }

    #[tokio::test]
    async fn concurrent_writes_get_distinct_versions() {
        let store = Arc::new(ChannelStore::default());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.write(&Channel::Scratchpad, json!(format!("w{i}")), Utc::now()).await
            }));
        }
        let mut versions = Vec::new();
        for h in handles {
            versions.push(h.await.unwrap());
        }
        versions.sort_unstable();
        assert_eq!(versions, (1..=32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn history_tracks_every_write_in_order() {
        let store = ChannelStore::default();
        let start = Utc::now();
        for (i, level) in ["Bravo", "Charlie", "Bravo"].iter().enumerate() {
            store
                .write(&Channel::Fpcon, json!(level), start + Duration::seconds(i as i64))
                .await;
        }

        let history = store.history(&Channel::Fpcon).await;
        let values: Vec<_> = history.iter().map(|h| h.value.clone()).collect();
        assert_eq!(values, vec![json!("Bravo"), json!("Charlie"), json!("Bravo")]);

        let snap = store.read(&Channel::Fpcon).await;
        assert_eq!(snap.value, history.last().unwrap().value);
        assert_eq!(snap.history.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn history_timestamps_never_decrease() {
        let store = ChannelStore::default();
        let now = Utc::now();
        store.write(&Channel::Fpcon, json!("Alpha"), now).await;
        store
            .write(&Channel::Fpcon, json!("Delta"), now - Duration::seconds(30))
            .await;

        let history = store.history(&Channel::Fpcon).await;
        assert!(history[1].recorded_at >= history[0].recorded_at);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let store = ChannelStore::new(2);
        for level in ["Alpha", "Bravo", "Charlie"] {
            store.write(&Channel::Fpcon, json!(level), Utc::now()).await;
        }
        let values: Vec<_> = store
            .history(&Channel::Fpcon)
            .await
            .into_iter()
            .map(|h| h.value)
            .collect();
        assert_eq!(values, vec![json!("Bravo"), json!("Charlie")]);
    }

    #[tokio::test]
    async fn untracked_channels_keep_no_history() {
        let store = ChannelStore::default();
        store.write(&Channel::Scratchpad, json!("x"), Utc::now()).await;
        assert!(store.history(&Channel::Scratchpad).await.is_empty());
        assert_matches!(
            store.append_history(&Channel::Scratchpad, json!("y"), Utc::now()).await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn restore_and_reset() {
        let store = ChannelStore::default();
        let mut snap = ChannelSnapshot::initial(Channel::Fpcon);
        snap.version = 7;
        snap.value = json!("Charlie");
        snap.history = Some(vec![HistoryEntry { value: json!("Charlie"), recorded_at: Utc::now() }]);
        store.restore(snap).await;

        assert_eq!(store.version(&Channel::Fpcon).await, 7);
        assert_eq!(store.write(&Channel::Fpcon, json!("Delta"), Utc::now()).await, 8);

        store.write(&Channel::Scratchpad, json!("kept"), Utc::now()).await;
        store.remove(&Channel::Fpcon).await;
        assert_eq!(store.version(&Channel::Fpcon).await, 0);
        assert_eq!(store.version(&Channel::Scratchpad).await, 1);

        store.reset().await;
        assert_eq!(store.version(&Channel::Scratchpad).await, 0);
    }
}
