//! Domain types and pure logic for the opswatch state-sync core.
//!
//! Nothing in this crate performs I/O. The store, hub, and probing crates
//! build on these types.

pub mod channel;
pub mod equipment;
pub mod error;
pub mod event_log;
pub mod fpcon;
pub mod monitoring;
pub mod stats;
pub mod transition;
pub mod types;
