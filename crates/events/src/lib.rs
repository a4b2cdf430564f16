//! Shared-state synchronization for opswatch.
//!
//! - [`ChannelStore`]: versioned per-channel values with bounded history.
//! - [`BroadcastHub`]: observer registry and ordered per-channel fan-out.
//! - [`WriteAuthorizer`]: the seam through which the auth layer decides
//!   who may write which channel.
//! - [`collection`]: item-level edits to the list channels.
//! - [`EventLog`]: capped, most-recent-first operational log kept on the
//!   `events` channel.
//! - [`persistence`]: record stores and the background write-through task.

pub mod auth;
pub mod collection;
pub mod event_log;
pub mod hub;
pub mod persistence;
pub mod store;

pub use auth::{AllowAll, Principal, TokenAuthorizer, WriteAuthorizer};
pub use collection::{remove_item, upsert_item};
pub use event_log::EventLog;
pub use hub::{BroadcastHub, ChannelUpdate, Observer, ObserverId, Writer};
pub use persistence::{
    seed, ChannelPersistence, JsonFileStore, MemoryRecordStore, PersistenceError, RecordStore,
};
pub use store::ChannelStore;
