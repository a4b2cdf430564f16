//! Edge-triggered reachability state machine.
//!
//! Pure logic. The caller owns one [`HostMachine`] per monitored host and
//! acts on the [`Transition`]s it returns.

use crate::monitoring::Reachability;
use crate::types::Timestamp;

/// A change of externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Reachability,
    pub to: Reachability,
    pub observed_at: Timestamp,
}

/// Two-state machine for a single host.
#[derive(Debug, Clone, Default)]
pub struct HostMachine {
    state: Reachability,
}

impl HostMachine {
    /// Start from the optimistic `Active` default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an explicit baseline.
    pub fn with_baseline(state: Reachability) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Reachability {
        self.state
    }

    /// Feed one probe outcome.
    ///
    /// Returns a transition only when the outcome differs from the current
    /// state; repeated identical outcomes return `None`.
    pub fn observe(&mut self, success: bool, observed_at: Timestamp) -> Option<Transition> {
        let next = Reachability::from_success(success);
        if next == self.state {
            return None;
        }
        let from = std::mem::replace(&mut self.state, next);
        Some(Transition { from, to: next, observed_at })
    }

    /// Replace the state after a manual change. The next probe is compared
    /// against this value.
    pub fn reset(&mut self, baseline: Reachability) {
        self.state = baseline;
    }
}
