//! Active reachability monitoring for opswatch.
//!
//! - [`Prober`]: the reachability check seam, with [`SystemPing`] as the
//!   production implementation.
//! - [`ProbeScheduler`]: one cancellable probe loop per monitored host.
//! - [`StatusTransitionEngine`]: edge-triggered state machine per host
//!   that rewrites equipment status and logs transitions.
//! - [`MonitorService`]: configuration surface tying the two together.

pub mod engine;
pub mod probe;
pub mod scheduler;
pub mod service;

pub use engine::StatusTransitionEngine;
pub use probe::{ProbeError, ProbeOutcome, Prober, SystemPing};
pub use scheduler::{ProbeScheduler, ProbeSink};
pub use service::MonitorService;
