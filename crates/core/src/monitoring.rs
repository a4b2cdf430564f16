//! Monitored hosts, probe results, and probe scheduling parameters.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ServiceId, Timestamp};

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60_000;

/// Reachability-derived status of a monitored host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reachability {
    /// Optimistic default before the first probe.
    #[default]
    Active,
    Inactive,
}

impl Reachability {
    pub fn from_success(success: bool) -> Self {
        if success {
            Reachability::Active
        } else {
            Reachability::Inactive
        }
    }

    /// Value written to the equipment service's `status` field.
    pub fn status_value(self) -> &'static str {
        match self {
            Reachability::Active => "active",
            Reachability::Inactive => "inactive",
        }
    }

    /// Colour token written alongside the status.
    pub fn status_color(self) -> &'static str {
        match self {
            Reachability::Active => "success",
            Reachability::Inactive => "error",
        }
    }

    pub fn is_active(self) -> bool {
        self == Reachability::Active
    }

    /// Interpret an equipment service's `status` field, if it is one the
    /// engine writes.
    pub fn from_status(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Reachability::Active),
            "inactive" => Some(Reachability::Inactive),
            _ => None,
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Active => f.write_str("Active"),
            Reachability::Inactive => f.write_str("Inactive"),
        }
    }
}

/// Monitoring configuration as entered by an operator.
///
/// Interval is in seconds and timeout in minutes; both are converted to
/// milliseconds internally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSettings {
    pub hostname: String,
    pub interval_secs: u64,
    pub timeout_mins: u64,
    #[serde(default)]
    pub auto_status_change: bool,
    /// Whether probing is switched on. Independent of reachability.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_hostname(&self.hostname)?;
        if self.interval_secs == 0 {
            return Err(CoreError::Validation("intervalSecs must be positive".into()));
        }
        if self.timeout_mins == 0 {
            return Err(CoreError::Validation("timeoutMins must be positive".into()));
        }
        Ok(())
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_secs.saturating_mul(MS_PER_SECOND)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_mins.saturating_mul(MS_PER_MINUTE)
    }

    pub fn schedule(&self) -> Result<ProbeSchedule, CoreError> {
        ProbeSchedule::from_millis(self.interval_ms(), self.timeout_ms())
    }
}

/// Hostnames are passed to an external probe command, so option-like or
/// whitespace-bearing values are rejected up front.
fn validate_hostname(hostname: &str) -> Result<(), CoreError> {
    let valid = !hostname.is_empty()
        && hostname.len() <= 253
        && !hostname.starts_with('-')
        && hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("invalid hostname: {hostname:?}")))
    }
}

/// Tick-to-tick interval and per-probe timeout for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSchedule {
    pub interval: Duration,
    pub timeout: Duration,
}

impl ProbeSchedule {
    /// Both values must be positive. A timeout longer than the interval is
    /// allowed.
    pub fn from_millis(interval_ms: u64, timeout_ms: u64) -> Result<Self, CoreError> {
        if interval_ms == 0 || timeout_ms == 0 {
            return Err(CoreError::Validation(
                "probe interval and timeout must be positive".into(),
            ));
        }
        Ok(Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// A host opted into monitoring, keyed by the equipment service it backs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredHost {
    pub service_id: ServiceId,
    pub hostname: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub auto_status_change: bool,
    /// Reachability-derived, owned by the transition engine.
    pub currently_active: bool,
    /// Operator switch for probing, never derived from reachability.
    pub is_active: bool,
}

impl MonitoredHost {
    pub fn new(service_id: impl Into<ServiceId>, settings: &MonitorSettings) -> Self {
        Self {
            service_id: service_id.into(),
            hostname: settings.hostname.clone(),
            interval_ms: settings.interval_ms(),
            timeout_ms: settings.timeout_ms(),
            auto_status_change: settings.auto_status_change,
            currently_active: true,
            is_active: settings.is_active,
        }
    }
}

/// Outcome of a single probe, consumed immediately by the transition engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub service_id: ServiceId,
    pub success: bool,
    pub round_trip_ms: Option<f64>,
    pub observed_at: Timestamp,
}

/// Live readout published on a host's `monitor:<serviceId>` channel after
/// every probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub service_id: ServiceId,
    pub hostname: String,
    pub status: Reachability,
    pub is_active: bool,
    pub auto_status_change: bool,
    pub ping_results: Vec<bool>,
    pub average_response_time: f64,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub last_probe_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn settings() -> MonitorSettings {
        MonitorSettings {
            hostname: "8.8.8.8".into(),
            interval_secs: 5,
            timeout_mins: 240,
            auto_status_change: true,
            is_active: true,
        }
    }

    #[test]
    fn converts_external_units_to_millis() {
        let s = settings();
        assert_eq!(s.interval_ms(), 5_000);
        assert_eq!(s.timeout_ms(), 14_400_000);

        let schedule = s.schedule().unwrap();
        assert_eq!(schedule.interval, Duration::from_secs(5));
        assert_eq!(schedule.timeout, Duration::from_secs(240 * 60));
    }

    #[test]
    fn rejects_non_positive_values() {
        let mut s = settings();
        s.interval_secs = 0;
        assert_matches!(s.validate(), Err(CoreError::Validation(_)));

        assert_matches!(ProbeSchedule::from_millis(1000, 0), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_option_like_hostnames() {
        for bad in ["", "-c 100", "host name", "a;b"] {
            let s = MonitorSettings { hostname: bad.into(), ..settings() };
            assert_matches!(s.validate(), Err(CoreError::Validation(_)), "{bad:?}");
        }
        let s = MonitorSettings { hostname: "mail.example.mil".into(), ..settings() };
        assert!(s.validate().is_ok());
    }

    #[test]
    fn new_host_starts_optimistically_active() {
        let host = MonitoredHost::new("svc-1", &settings());
        assert!(host.currently_active);
        assert!(host.is_active);
        assert_eq!(host.interval_ms, 5_000);
    }

    #[test]
    fn settings_default_to_active_probing() {
        let s: MonitorSettings = serde_json::from_value(serde_json::json!({
            "hostname": "10.0.0.1", "intervalSecs": 5, "timeoutMins": 1
        }))
        .unwrap();
        assert!(s.is_active);
        assert!(!s.auto_status_change);
    }

    #[test]
    fn reads_engine_written_statuses() {
        assert_eq!(Reachability::from_status("Inactive"), Some(Reachability::Inactive));
        assert_eq!(Reachability::from_status("active"), Some(Reachability::Active));
        assert_eq!(Reachability::from_status("degraded"), None);
    }
}
