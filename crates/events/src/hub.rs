//! Observer registry and per-channel fan-out.
//!
//! [`BroadcastHub`] groups observers by channel. Every accepted write is
//! stored through the [`ChannelStore`] and delivered to each observer of
//! that channel while the channel's observer lock is held, so all observers
//! see updates in the order the writes were accepted. Channels do not share
//! a lock, so delivery on one channel never waits on another.
//!
//! Observers receive updates over an unbounded `mpsc` channel. A closed
//! receiver means the connection is gone; the observer is detached on the
//! next delivery attempt and the write still succeeds for everyone else.
//!
//! Monitor channels exist only while their service is registered with
//! [`BroadcastHub::register_monitor`]. A channel's observer slot is dropped
//! when its last observer detaches, so the registry only holds channels that
//! are actually observed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock as SyncRwLock};

use chrono::Utc;
use opswatch_core::channel::{Channel, ChannelSnapshot, HistoryEntry};
use opswatch_core::error::CoreError;
use opswatch_core::types::{Timestamp, Version};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex, OwnedMutexGuard, RwLock};

use crate::auth::{Principal, WriteAuthorizer};
use crate::store::ChannelStore;

/// Buffer capacity of the process-internal update feed.
const FEED_CAPACITY: usize = 1024;

/// Transient handle of an attached observer.
pub type ObserverId = u64;

/// One accepted write, as delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdate {
    pub channel: Channel,
    pub version: Version,
    pub value: Value,
    pub updated_at: Timestamp,
}

/// Sender half held by the hub for one observer.
type UpdateSender = mpsc::UnboundedSender<Arc<ChannelUpdate>>;

type FeedSender = broadcast::Sender<Arc<ChannelUpdate>>;

/// A freshly attached observer.
///
/// `snapshot` is the channel state at attach time; `updates` yields every
/// later write, in acceptance order, until the observer is detached.
#[derive(Debug)]
pub struct Observer {
    pub id: ObserverId,
    pub channel: Channel,
    pub snapshot: ChannelSnapshot,
    pub updates: mpsc::UnboundedReceiver<Arc<ChannelUpdate>>,
}

/// The party submitting a write.
#[derive(Debug, Clone)]
pub struct Writer {
    pub principal: Principal,
    /// The writer's own observer, excluded from fan-out to avoid echo.
    pub origin: Option<ObserverId>,
}

impl Writer {
    pub fn new(principal: Principal) -> Self {
        Self { principal, origin: None }
    }

    pub fn system() -> Self {
        Self::new(Principal::System)
    }

    /// Mark the write as coming from an attached observer.
    pub fn via(mut self, observer: ObserverId) -> Self {
        self.origin = Some(observer);
        self
    }
}

#[derive(Default)]
struct ChannelObservers {
    /// Ordered by id, i.e. by attach order.
    senders: BTreeMap<ObserverId, UpdateSender>,
    /// Set once the slot has been removed from the registry. Whoever locks
    /// a retired slot looks the channel up again.
    retired: bool,
}

/// Fan-out hub shared via `Arc<BroadcastHub>`.
///
/// Lock order: `channels`, then a channel's observers, then `monitors` or
/// `index`.
pub struct BroadcastHub {
    store: Arc<ChannelStore>,
    authorizer: Arc<dyn WriteAuthorizer>,
    channels: RwLock<HashMap<Channel, Arc<Mutex<ChannelObservers>>>>,
    monitors: RwLock<HashSet<String>>,
    index: Mutex<HashMap<ObserverId, Channel>>,
    next_id: AtomicU64,
    feed: SyncRwLock<Option<FeedSender>>,
}

impl BroadcastHub {
    pub fn new(store: Arc<ChannelStore>, authorizer: Arc<dyn WriteAuthorizer>) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            store,
            authorizer,
            channels: RwLock::new(HashMap::new()),
            monitors: RwLock::new(HashSet::new()),
            index: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            feed: SyncRwLock::new(Some(feed)),
        }
    }

    pub fn store(&self) -> &Arc<ChannelStore> {
        &self.store
    }

    /// Open the `monitor:<service_id>` channel.
    pub async fn register_monitor(&self, service_id: &str) {
        if self.monitors.write().await.insert(service_id.to_string()) {
            tracing::debug!(service_id, "Monitor channel opened");
        }
    }

    /// Close the `monitor:<service_id>` channel.
    ///
    /// Its observers are detached (their update streams end) and its stored
    /// readout is dropped. Returns whether the channel was open.
    pub async fn unregister_monitor(&self, service_id: &str) -> bool {
        let channel = Channel::monitor(service_id);
        let mut channels = self.channels.write().await;
        let known = self.monitors.write().await.remove(service_id);
        let observers = channels.remove(&channel);
        drop(channels);

        let mut ended = 0;
        if let Some(observers) = observers {
            let mut guard = observers.lock().await;
            guard.retired = true;
            let senders = std::mem::take(&mut guard.senders);
            ended = senders.len();
            let mut index = self.index.lock().await;
            for id in senders.keys() {
                index.remove(id);
            }
        }
        self.store.remove(&channel).await;

        tracing::debug!(service_id, detached = ended, "Monitor channel closed");
        known
    }

    /// Parse a wire name and check the channel is currently open.
    pub async fn resolve(&self, name: &str) -> Result<Channel, CoreError> {
        let channel = Channel::parse(name)?;
        self.ensure_known(&channel).await?;
        Ok(channel)
    }

    /// Register an observer and return it with the channel's current state.
    ///
    /// Fails with `UnknownChannel` for monitor channels that are not open.
    pub async fn attach(&self, channel: &Channel) -> Result<Observer, CoreError> {
        let mut guard = self.lock_observers(channel).await?;

        // Read under the observer lock so no write falls between the
        // snapshot and the first delivered update.
        let snapshot = self.store.read(channel).await;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        guard.senders.insert(id, tx);
        self.index.lock().await.insert(id, channel.clone());
        drop(guard);

        tracing::info!(observer_id = id, channel = %channel, version = snapshot.version, "Observer attached");

        Ok(Observer {
            id,
            channel: channel.clone(),
            snapshot,
            updates: rx,
        })
    }

    /// Attach by wire name; fails with `UnknownChannel` for unrecognised names.
    pub async fn attach_named(&self, name: &str) -> Result<Observer, CoreError> {
        let channel = Channel::parse(name)?;
        self.attach(&channel).await
    }

    /// Remove an observer. Unknown or already-detached ids are ignored.
    ///
    /// The channel's slot is released once its last observer leaves.
    pub async fn detach(&self, id: ObserverId) {
        let Some(channel) = self.index.lock().await.remove(&id) else {
            return;
        };
        let mut channels = self.channels.write().await;
        if let Some(observers) = channels.get(&channel).cloned() {
            let mut guard = observers.lock().await;
            guard.senders.remove(&id);
            if guard.senders.is_empty() {
                guard.retired = true;
                channels.remove(&channel);
            }
        }
        drop(channels);
        tracing::info!(observer_id = id, channel = %channel, "Observer detached");
    }

    /// Store `value` on `channel` and deliver it to the channel's observers.
    ///
    /// Returns the new version. The writer's own observer, if any, is
    /// skipped. Observers whose connection is gone are detached silently.
    pub async fn publish(
        &self,
        channel: &Channel,
        value: Value,
        writer: &Writer,
    ) -> Result<Version, CoreError> {
        self.publish_versioned(channel, value, None, writer).await
    }

    /// Like [`publish`](Self::publish), but only if the channel is still at
    /// `expected_version`.
    ///
    /// A stale expectation fails with `Conflict` and changes nothing, so a
    /// client replacing a whole collection cannot silently overwrite a write
    /// it has not seen.
    pub async fn publish_versioned(
        &self,
        channel: &Channel,
        value: Value,
        expected_version: Option<Version>,
        writer: &Writer,
    ) -> Result<Version, CoreError> {
        self.authorize(writer, channel)?;
        if !channel.accepts_replacement() {
            return Err(CoreError::Validation(format!(
                "{channel} only changes entry by entry"
            )));
        }
        channel.validate(&value)?;

        let mut guard = self.lock_observers(channel).await?;
        if let Some(expected) = expected_version {
            let current = self.store.version(channel).await;
            if current != expected {
                tracing::debug!(channel = %channel, current, expected, "Rejected stale write");
                return Err(CoreError::Conflict(format!(
                    "{channel} is at version {current}, not {expected}"
                )));
            }
        }
        Ok(self.commit(channel, &mut guard, value, writer).await)
    }

    /// Publish by wire name; fails with `UnknownChannel` for unrecognised names.
    pub async fn publish_named(
        &self,
        name: &str,
        value: Value,
        writer: &Writer,
    ) -> Result<Version, CoreError> {
        let channel = Channel::parse(name)?;
        self.publish(&channel, value, writer).await
    }

    /// Read-modify-write under the channel's lock.
    ///
    /// `f` receives the current value and returns the replacement, or
    /// `None` to leave the channel untouched (no version bump, no
    /// delivery). Errors from `f` abort the write.
    pub async fn modify<F>(
        &self,
        channel: &Channel,
        writer: &Writer,
        f: F,
    ) -> Result<Option<Version>, CoreError>
    where
        F: FnOnce(&Value) -> Result<Option<Value>, CoreError>,
    {
        self.authorize(writer, channel)?;

        let mut guard = self.lock_observers(channel).await?;
        let current = self.store.read(channel).await;
        let Some(next) = f(&current.value)? else {
            return Ok(None);
        };
        channel.validate(&next)?;
        Ok(Some(self.commit(channel, &mut guard, next, writer).await))
    }

    pub async fn snapshot(&self, channel: &Channel) -> ChannelSnapshot {
        self.store.read(channel).await
    }

    pub async fn history(&self, channel: &Channel) -> Vec<HistoryEntry> {
        self.store.history(channel).await
    }

    /// Subscribe to every accepted write on every channel.
    ///
    /// Used by in-process consumers such as persistence; slow receivers
    /// observe `RecvError::Lagged`. After [`close_feed`](Self::close_feed)
    /// the returned receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChannelUpdate>> {
        let feed = self.feed.read().unwrap_or_else(|e| e.into_inner());
        match feed.as_ref() {
            Some(feed) => feed.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// End the update feed. Subscribers drain what was sent, then see
    /// `RecvError::Closed`; later writes are no longer fed.
    pub fn close_feed(&self) {
        let closed = self.feed.write().unwrap_or_else(|e| e.into_inner()).take();
        if closed.is_some() {
            tracing::info!("Update feed closed");
        }
    }

    pub async fn observer_count(&self, channel: &Channel) -> usize {
        let observers = self.channels.read().await.get(channel).cloned();
        match observers {
            Some(observers) => observers.lock().await.senders.len(),
            None => 0,
        }
    }

    /// Number of attached observers across all channels.
    pub async fn connection_count(&self) -> usize {
        self.index.lock().await.len()
    }

    /// Number of channels currently holding an observer slot.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Detach every observer. Their update streams end.
    ///
    /// Used during graceful shutdown.
    pub async fn close_all(&self) -> usize {
        let channels: Vec<_> = self.channels.write().await.drain().map(|(_, o)| o).collect();
        let mut count = 0;
        for observers in channels {
            let mut guard = observers.lock().await;
            count += guard.senders.len();
            guard.senders.clear();
            guard.retired = true;
        }
        self.index.lock().await.clear();
        tracing::info!(count, "Detached all observers");
        count
    }

    /// Check a writer against the authorizer without writing anything.
    ///
    /// In-process writers are always allowed.
    pub fn authorize(&self, writer: &Writer, channel: &Channel) -> Result<(), CoreError> {
        if writer.principal == Principal::System
            || self.authorizer.authorize(&writer.principal, channel)
        {
            return Ok(());
        }
        tracing::warn!(channel = %channel, "Rejected unauthorized write");
        Err(CoreError::Unauthorized {
            channel: channel.to_string(),
        })
    }

    // ---- private helpers ----

    async fn ensure_known(&self, channel: &Channel) -> Result<(), CoreError> {
        if let Channel::Monitor(id) = channel {
            if !self.monitors.read().await.contains(id) {
                return Err(CoreError::UnknownChannel(channel.to_string()));
            }
        }
        Ok(())
    }

    async fn observers_for(&self, channel: &Channel) -> Result<Arc<Mutex<ChannelObservers>>, CoreError> {
        if let Some(observers) = self.channels.read().await.get(channel) {
            return Ok(Arc::clone(observers));
        }
        let mut channels = self.channels.write().await;
        self.ensure_known(channel).await?;
        Ok(Arc::clone(channels.entry(channel.clone()).or_default()))
    }

    /// Lock the live observer slot of `channel`, creating it if needed.
    async fn lock_observers(&self, channel: &Channel) -> Result<OwnedMutexGuard<ChannelObservers>, CoreError> {
        loop {
            let guard = self.observers_for(channel).await?.lock_owned().await;
            if !guard.retired {
                return Ok(guard);
            }
        }
    }

    /// Store and deliver. Caller holds the channel's observer lock.
    async fn commit(
        &self,
        channel: &Channel,
        observers: &mut ChannelObservers,
        value: Value,
        writer: &Writer,
    ) -> Version {
        let at = Utc::now();
        let version = self.store.write(channel, value.clone(), at).await;
        let update = Arc::new(ChannelUpdate {
            channel: channel.clone(),
            version,
            value,
            updated_at: at,
        });

        let mut gone = Vec::new();
        for (id, sender) in &observers.senders {
            if writer.origin == Some(*id) {
                continue;
            }
            if sender.send(Arc::clone(&update)).is_err() {
                gone.push(*id);
            }
        }

        if !gone.is_empty() {
            let mut index = self.index.lock().await;
            for id in &gone {
                observers.senders.remove(id);
                index.remove(id);
            }
            tracing::warn!(channel = %channel, count = gone.len(), "Detached closed observers");
        }

        tracing::debug!(
            channel = %channel,
            version,
            delivered = observers.senders.len(),
            "Published channel update"
        );

        let feed = self.feed.read().unwrap_or_else(|e| e.into_inner());
        if let Some(feed) = feed.as_ref() {
            // A send error only means nothing is subscribed.
            let _ = feed.send(update);
        }
        version
    }
}
