//! Per-host probe loops.
//!
//! [`ProbeScheduler`] runs one task per monitored host. Each task probes,
//! hands the result to a [`ProbeSink`], and sleeps until one interval after
//! the tick *started*. A probe that overruns its interval makes the next
//! tick fire immediately; ticks for one host never overlap. Hosts never
//! share a task, so a hung probe only stalls its own host.
//!
//! Every task holds a child of the scheduler's master
//! [`CancellationToken`]. Stopping a host cancels its token, which also
//! aborts a probe still in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use opswatch_core::error::CoreError;
use opswatch_core::monitoring::{MonitoredHost, ProbeResult, ProbeSchedule};
use opswatch_core::types::ServiceId;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::probe::{ProbeError, ProbeOutcome, Prober};

/// How long `stop_monitoring` and `shutdown` wait for a task to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer of probe results, called once per tick in tick order.
#[async_trait]
pub trait ProbeSink: Send + Sync {
    async fn record(&self, result: ProbeResult);
}

/// Bookkeeping for one running host loop.
struct ScheduledHost {
    hostname: String,
    schedule: watch::Sender<ProbeSchedule>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ProbeScheduler {
    prober: Arc<dyn Prober>,
    sink: Arc<dyn ProbeSink>,
    hosts: Mutex<HashMap<ServiceId, ScheduledHost>>,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

impl ProbeScheduler {
    pub fn new(prober: Arc<dyn Prober>, sink: Arc<dyn ProbeSink>) -> Self {
        Self {
            prober,
            sink,
            hosts: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Start probing `host`. A loop already running for the same service
    /// is stopped before the new one starts, so two loops never probe the
    /// same service at once.
    pub async fn start_monitoring(&self, host: &MonitoredHost) -> Result<(), CoreError> {
        let schedule = ProbeSchedule::from_millis(host.interval_ms, host.timeout_ms)?;

        let mut hosts = self.hosts.lock().await;
        if self.cancel.is_cancelled() {
            return Err(CoreError::Conflict("probe scheduler is shut down".into()));
        }
        if let Some(previous) = hosts.remove(&host.service_id) {
            tracing::debug!(service_id = %host.service_id, "Replacing running probe loop");
            stop(previous).await;
        }

        let (schedule_tx, schedule_rx) = watch::channel(schedule);
        let cancel = self.cancel.child_token();
        let handle = tokio::spawn(run_host(
            host.service_id.clone(),
            host.hostname.clone(),
            Arc::clone(&self.prober),
            Arc::clone(&self.sink),
            schedule_rx,
            cancel.clone(),
        ));
        hosts.insert(
            host.service_id.clone(),
            ScheduledHost {
                hostname: host.hostname.clone(),
                schedule: schedule_tx,
                cancel,
                handle,
            },
        );
        drop(hosts);

        tracing::info!(
            service_id = %host.service_id,
            hostname = %host.hostname,
            interval_ms = host.interval_ms,
            timeout_ms = host.timeout_ms,
            "Monitoring started"
        );
        Ok(())
    }

    /// Stop probing a host. Returns `false` if it was not running.
    pub async fn stop_monitoring(&self, service_id: &str) -> bool {
        let Some(scheduled) = self.hosts.lock().await.remove(service_id) else {
            return false;
        };
        stop(scheduled).await;
        tracing::info!(service_id = %service_id, "Monitoring stopped");
        true
    }

    /// Change a running host's interval and timeout.
    ///
    /// The tick in progress keeps the values it started with; the new ones
    /// apply from the next tick.
    pub async fn update_schedule(
        &self,
        service_id: &str,
        interval_ms: u64,
        timeout_ms: u64,
    ) -> Result<(), CoreError> {
        let schedule = ProbeSchedule::from_millis(interval_ms, timeout_ms)?;
        let hosts = self.hosts.lock().await;
        let scheduled = hosts.get(service_id).ok_or_else(|| CoreError::NotFound {
            entity: "MonitoredHost",
            id: service_id.to_string(),
        })?;
        scheduled.schedule.send_replace(schedule);
        tracing::debug!(service_id = %service_id, interval_ms, timeout_ms, "Probe schedule updated");
        Ok(())
    }

    pub async fn is_running(&self, service_id: &str) -> bool {
        self.hosts.lock().await.contains_key(service_id)
    }

    /// Hostname a running loop is probing.
    pub async fn hostname(&self, service_id: &str) -> Option<String> {
        self.hosts
            .lock()
            .await
            .get(service_id)
            .map(|s| s.hostname.clone())
    }

    pub async fn running_count(&self) -> usize {
        self.hosts.lock().await.len()
    }

    /// Cancel every loop and wait for each to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down probe scheduler");
        self.cancel.cancel();

        let drained: Vec<_> = self.hosts.lock().await.drain().collect();
        for (service_id, scheduled) in drained {
            tracing::debug!(service_id = %service_id, "Stopping probe loop");
            stop(scheduled).await;
        }

        tracing::info!("Probe scheduler shut down complete");
    }
}

async fn stop(scheduled: ScheduledHost) {
    scheduled.cancel.cancel();
    let _ = tokio::time::timeout(STOP_TIMEOUT, scheduled.handle).await;
}

async fn run_host(
    service_id: ServiceId,
    hostname: String,
    prober: Arc<dyn Prober>,
    sink: Arc<dyn ProbeSink>,
    schedule: watch::Receiver<ProbeSchedule>,
    cancel: CancellationToken,
) {
    loop {
        let started = Instant::now();
        let current = *schedule.borrow();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = probe_once(prober.as_ref(), &hostname, current.timeout) => outcome,
        };

        tracing::debug!(
            service_id = %service_id,
            success = outcome.success,
            round_trip_ms = ?outcome.round_trip_ms,
            "Probe completed"
        );

        sink.record(ProbeResult {
            service_id: service_id.clone(),
            success: outcome.success,
            round_trip_ms: outcome.round_trip_ms,
            observed_at: Utc::now(),
        })
        .await;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(started + current.interval) => {}
        }
    }
    tracing::debug!(service_id = %service_id, "Probe loop exited");
}

/// One bounded probe. Errors and timeouts both count as unreachable.
async fn probe_once(prober: &dyn Prober, hostname: &str, timeout: Duration) -> ProbeOutcome {
    let result = match tokio::time::timeout(timeout, prober.probe(hostname, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    };
    result.unwrap_or_else(|e| {
        tracing::debug!(hostname = %hostname, error = %e, "Probe failed");
        ProbeOutcome::unreachable()
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use tokio::sync::mpsc;

    use super::*;

    /// Replays a fixed script of (delay, success) steps, then repeats the
    /// last one forever.
    struct ScriptedProber {
        steps: StdMutex<VecDeque<(Duration, bool)>>,
    }

    impl ScriptedProber {
        fn new(steps: &[(u64, bool)]) -> Arc<Self> {
            Arc::new(Self {
                steps: StdMutex::new(
                    steps
                        .iter()
                        .map(|&(ms, ok)| (Duration::from_millis(ms), ok))
                        .collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, _hostname: &str, _timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
            let (delay, ok) = {
                let mut steps = self.steps.lock().unwrap();
                if steps.len() > 1 {
                    steps.pop_front().unwrap()
                } else {
                    *steps.front().unwrap()
                }
            };
            tokio::time::sleep(delay).await;
            Ok(if ok {
                ProbeOutcome::reachable(Some(delay.as_secs_f64() * 1_000.0))
            } else {
                ProbeOutcome::unreachable()
            })
        }
    }

    /// Records the highest number of probes in flight at once.
    #[derive(Default)]
    struct ConcurrencyProber {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Prober for ConcurrencyProber {
        async fn probe(&self, _hostname: &str, _timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(ProbeOutcome::reachable(Some(200.0)))
        }
    }

    struct ChannelSink(mpsc::UnboundedSender<(ProbeResult, Instant)>);

    #[async_trait]
    impl ProbeSink for ChannelSink {
        async fn record(&self, result: ProbeResult) {
            let _ = self.0.send((result, Instant::now()));
        }
    }

    fn host(id: &str, interval_ms: u64, timeout_ms: u64) -> MonitoredHost {
        MonitoredHost {
            service_id: id.into(),
            hostname: "10.0.0.1".into(),
            interval_ms,
            timeout_ms,
            auto_status_change: false,
            currently_active: true,
            is_active: true,
        }
    }

    fn scheduler(
        prober: Arc<dyn Prober>,
    ) -> (ProbeScheduler, mpsc::UnboundedReceiver<(ProbeResult, Instant)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProbeScheduler::new(prober, Arc::new(ChannelSink(tx))), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn interval_is_measured_tick_to_tick() {
        let (scheduler, mut rx) = scheduler(ScriptedProber::new(&[(300, true)]));
        let origin = Instant::now();
        scheduler.start_monitoring(&host("a", 1_000, 5_000)).await.unwrap();

        let mut at = Vec::new();
        for _ in 0..3 {
            at.push(rx.recv().await.unwrap().1 - origin);
        }
        assert_eq!(
            at,
            vec![
                Duration::from_millis(300),
                Duration::from_millis(1_300),
                Duration::from_millis(2_300),
            ]
        );
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_probe_fires_next_tick_immediately() {
        let (scheduler, mut rx) = scheduler(ScriptedProber::new(&[(1_500, true)]));
        let origin = Instant::now();
        scheduler.start_monitoring(&host("a", 1_000, 5_000)).await.unwrap();

        let first = rx.recv().await.unwrap().1 - origin;
        let second = rx.recv().await.unwrap().1 - origin;
        assert_eq!(first, Duration::from_millis(1_500));
        assert_eq!(second, Duration::from_millis(3_000));
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let (scheduler, mut rx) = scheduler(ScriptedProber::new(&[(60_000, true)]));
        let origin = Instant::now();
        scheduler.start_monitoring(&host("a", 1_000, 200)).await.unwrap();

        let (result, at) = rx.recv().await.unwrap();
        assert!(!result.success);
        assert_eq!(at - origin, Duration::from_millis(200));
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drops_future_ticks_and_is_idempotent() {
        let (scheduler, mut rx) = scheduler(ScriptedProber::new(&[(10, true)]));
        scheduler.start_monitoring(&host("a", 100, 1_000)).await.unwrap();
        rx.recv().await.unwrap();

        assert!(scheduler.stop_monitoring("a").await);
        assert!(!scheduler.stop_monitoring("a").await);
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.running_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_host_does_not_block_others() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn ProbeSink> = Arc::new(ChannelSink(tx));

        let hung = ProbeScheduler::new(ScriptedProber::new(&[(3_600_000, true)]), Arc::clone(&sink));
        let healthy = ProbeScheduler::new(ScriptedProber::new(&[(5, true)]), sink);
        hung.start_monitoring(&host("hung", 1_000, 600_000)).await.unwrap();
        healthy.start_monitoring(&host("ok", 100, 1_000)).await.unwrap();

        for _ in 0..5 {
            let (result, _) = rx.recv().await.unwrap();
            assert_eq!(result.service_id, "ok");
        }
        hung.shutdown().await;
        healthy.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_update_applies_from_next_tick() {
        let (scheduler, mut rx) = scheduler(ScriptedProber::new(&[(0, true)]));
        let origin = Instant::now();
        scheduler.start_monitoring(&host("a", 1_000, 500)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().1 - origin, Duration::ZERO);
        scheduler.update_schedule("a", 3_000, 500).await.unwrap();

        // The wait already in progress keeps the old interval.
        assert_eq!(rx.recv().await.unwrap().1 - origin, Duration::from_millis(1_000));
        assert_eq!(rx.recv().await.unwrap().1 - origin, Duration::from_millis(4_000));

        assert!(scheduler.update_schedule("missing", 1, 1).await.is_err());
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_running_loop() {
        let (scheduler, mut rx) = scheduler(ScriptedProber::new(&[(0, false)]));
        scheduler.start_monitoring(&host("a", 1_000, 500)).await.unwrap();
        scheduler.start_monitoring(&host("a", 1_000, 500)).await.unwrap();
        assert_eq!(scheduler.running_count().await, 1);

        rx.recv().await.unwrap();
        scheduler.shutdown().await;
        assert!(scheduler.start_monitoring(&host("b", 1_000, 500)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_never_overlaps_old_and_new_loop() {
        let prober = Arc::new(ConcurrencyProber::default());
        let (scheduler, mut rx) = scheduler(Arc::clone(&prober) as Arc<dyn Prober>);
        scheduler.start_monitoring(&host("a", 1_000, 500)).await.unwrap();

        // Restart while the first probe is still in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(prober.in_flight.load(Ordering::SeqCst), 1);
        scheduler.start_monitoring(&host("a", 1_000, 500)).await.unwrap();

        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        assert_eq!(prober.peak.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.running_count().await, 1);
        scheduler.shutdown().await;
    }
}
