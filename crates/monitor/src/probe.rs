//! Reachability checks.
//!
//! [`Prober`] is the seam between the scheduler and whatever actually
//! touches the network. [`SystemPing`] shells out to the platform `ping`
//! binary, sending a single echo request.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

/// Matches the round-trip time in ping output, e.g. `time=12.4 ms` or
/// `time<1ms`.
static RTT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time[=<]\s*([0-9]+(?:\.[0-9]+)?)\s*ms").expect("valid regex"));

/// Result of one reachability check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub round_trip_ms: Option<f64>,
}

impl ProbeOutcome {
    pub fn reachable(round_trip_ms: Option<f64>) -> Self {
        Self {
            success: true,
            round_trip_ms,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            success: false,
            round_trip_ms: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Failed to run probe command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Issues a single reachability check against a host.
///
/// Implementations should give up on their own once `timeout` elapses, but
/// the scheduler enforces the bound regardless.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, hostname: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError>;
}

/// ICMP echo via the system `ping` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPing;

impl SystemPing {
    fn command(hostname: &str, timeout: Duration) -> Command {
        let mut cmd = Command::new("ping");
        if cfg!(target_os = "windows") {
            cmd.args(["-n", "1", "-w"]).arg(timeout.as_millis().to_string());
        } else if cfg!(target_os = "macos") {
            cmd.args(["-c", "1", "-W"]).arg(timeout.as_millis().to_string());
        } else {
            let secs = timeout.as_secs().max(1);
            cmd.args(["-c", "1", "-W"]).arg(secs.to_string());
        }
        cmd.arg(hostname)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Prober for SystemPing {
    async fn probe(&self, hostname: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        let started = Instant::now();
        let output = tokio::time::timeout(timeout, Self::command(hostname, timeout).output())
            .await
            .map_err(|_| ProbeError::Timeout(timeout))??;

        if !output.status.success() {
            return Ok(ProbeOutcome::unreachable());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let rtt = parse_round_trip(&stdout)
            .unwrap_or_else(|| started.elapsed().as_secs_f64() * 1_000.0);
        Ok(ProbeOutcome::reachable(Some(rtt)))
    }
}

/// Extract the first round-trip time from ping output.
pub fn parse_round_trip(output: &str) -> Option<f64> {
    RTT_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
