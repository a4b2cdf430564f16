//! Durable channel state.
//!
//! [`ChannelPersistence`] subscribes to the hub's update feed and saves the
//! full snapshot of every persistent channel after each accepted write. On
//! startup [`seed`] loads whatever was saved back into the
//! [`ChannelStore`] before any observer attaches. Monitor channels are
//! never persisted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use opswatch_core::channel::{Channel, ChannelSnapshot};
use tokio::sync::{broadcast, Mutex};

use crate::hub::ChannelUpdate;
use crate::store::ChannelStore;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Backing store for channel snapshots.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, channel: &Channel) -> Result<Option<ChannelSnapshot>, PersistenceError>;
    async fn save(&self, snapshot: &ChannelSnapshot) -> Result<(), PersistenceError>;
}

/// Volatile record store, used in tests and when no data directory is set.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<Channel, ChannelSnapshot>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self, channel: &Channel) -> Result<Option<ChannelSnapshot>, PersistenceError> {
        Ok(self.records.lock().await.get(channel).cloned())
    }

    async fn save(&self, snapshot: &ChannelSnapshot) -> Result<(), PersistenceError> {
        self.records
            .lock()
            .await
            .insert(snapshot.channel.clone(), snapshot.clone());
        Ok(())
    }
}

/// One JSON document per channel under a data directory.
///
/// Writes go to a temporary file that is then renamed over the previous
/// document, so a crash mid-write leaves the old snapshot intact.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if missing) the data directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, channel: &Channel) -> PathBuf {
        self.dir.join(format!("{channel}.json"))
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self, channel: &Channel) -> Result<Option<ChannelSnapshot>, PersistenceError> {
        match tokio::fs::read(self.path_for(channel)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &ChannelSnapshot) -> Result<(), PersistenceError> {
        let path = self.path_for(&snapshot.channel);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Load every saved dashboard channel into `store`.
///
/// Returns the number of channels restored. A channel whose record cannot
/// be read is logged and left at its defaults.
pub async fn seed(store: &ChannelStore, records: &dyn RecordStore) -> usize {
    let mut restored = 0;
    for channel in Channel::FIXED.iter() {
        match records.load(channel).await {
            Ok(Some(snapshot)) if snapshot.channel == *channel => {
                store.restore(snapshot).await;
                restored += 1;
            }
            Ok(Some(_)) => {
                tracing::warn!(channel = %channel, "Stored record names another channel, ignoring");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, channel = %channel, "Failed to load channel record");
            }
        }
    }
    restored
}

/// Background service that saves channel state after every write.
pub struct ChannelPersistence;

impl ChannelPersistence {
    /// Run the persistence loop until the hub's feed is closed.
    pub async fn run(
        records: Arc<dyn RecordStore>,
        store: Arc<ChannelStore>,
        mut receiver: broadcast::Receiver<Arc<ChannelUpdate>>,
    ) {
        loop {
            match receiver.recv().await {
                Ok(update) => {
                    if !update.channel.is_persistent() {
                        continue;
                    }
                    Self::persist(records.as_ref(), &store, &update.channel).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Channel persistence lagged, saving all channels");
                    for channel in Channel::FIXED.iter() {
                        Self::persist(records.as_ref(), &store, channel).await;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Update feed closed, channel persistence shutting down");
                    break;
                }
            }
        }
    }

    /// Save the current snapshot of one channel.
    ///
    /// The snapshot is re-read from the store rather than taken from the
    /// update, so a burst of writes always ends with the latest state saved.
    async fn persist(records: &dyn RecordStore, store: &ChannelStore, channel: &Channel) {
        let snapshot = store.read(channel).await;
        if let Err(e) = records.save(&snapshot).await {
            tracing::error!(
                error = %e,
                channel = %channel,
                version = snapshot.version,
                "Failed to persist channel"
            );
        }
    }
}
