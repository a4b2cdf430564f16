//! Status transition engine.
//!
//! Consumes probe results one host at a time. Each host has its own
//! [`HostMachine`] behind its own lock, held while the effects of a result
//! are applied, so results for one host are handled strictly in order while
//! hosts never wait on each other.
//!
//! On a state change the engine:
//! 1. rewrites the equipment service's status through the hub, if the host
//!    has `auto_status_change` set;
//! 2. appends a system entry to the event log, whatever the flag says.
//!
//! After every result, changed or not, the host's live readout is
//! republished on its `monitor:<serviceId>` channel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use opswatch_core::channel::Channel;
use opswatch_core::equipment::{apply_service_status, find_service, EquipmentGroup, ServiceLocation};
use opswatch_core::error::CoreError;
use opswatch_core::event_log::{EventLevel, EventLogEntry, MONITORING_CATEGORY};
use opswatch_core::monitoring::{MonitorSnapshot, MonitoredHost, ProbeResult, Reachability};
use opswatch_core::stats::ProbeWindow;
use opswatch_core::transition::{HostMachine, Transition};
use opswatch_core::types::{ServiceId, Timestamp};
use opswatch_events::{BroadcastHub, EventLog, Writer};
use tokio::sync::{Mutex, RwLock};

use crate::scheduler::ProbeSink;

struct HostEntry {
    host: MonitoredHost,
    machine: HostMachine,
    window: ProbeWindow,
    last_probe_at: Option<Timestamp>,
    /// Set when the host is unregistered; late results are dropped.
    retired: bool,
}

impl HostEntry {
    fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            service_id: self.host.service_id.clone(),
            hostname: self.host.hostname.clone(),
            status: self.machine.state(),
            is_active: self.host.is_active,
            auto_status_change: self.host.auto_status_change,
            ping_results: self.window.results(),
            average_response_time: self.window.average_response_ms(),
            interval_ms: self.host.interval_ms,
            timeout_ms: self.host.timeout_ms,
            last_probe_at: self.last_probe_at,
        }
    }

    fn set_baseline(&mut self, baseline: Reachability) {
        self.machine.reset(baseline);
        self.host.currently_active = baseline.is_active();
    }
}

pub struct StatusTransitionEngine {
    hub: Arc<BroadcastHub>,
    event_log: Arc<EventLog>,
    hosts: RwLock<HashMap<ServiceId, Arc<Mutex<HostEntry>>>>,
}

impl StatusTransitionEngine {
    pub fn new(hub: Arc<BroadcastHub>, event_log: Arc<EventLog>) -> Self {
        Self {
            hub,
            event_log,
            hosts: RwLock::new(HashMap::new()),
        }
    }

    /// Add or reconfigure a host.
    ///
    /// Any (re)configuration is a manual action, so the state machine is
    /// reset to a fresh baseline: the status an operator last set on the
    /// equipment service when it is one the engine understands, otherwise
    /// the optimistic `Active` default. The rolling window survives a
    /// reconfiguration unless the hostname changed.
    pub async fn register(&self, host: MonitoredHost) -> MonitoredHost {
        let baseline = self.baseline_for(&host.service_id).await;
        self.hub.register_monitor(&host.service_id).await;

        let existing = self.hosts.read().await.get(&host.service_id).cloned();
        let registered = match existing {
            Some(entry) => {
                let mut entry = entry.lock().await;
                if entry.host.hostname != host.hostname {
                    entry.window.clear();
                    entry.last_probe_at = None;
                }
                entry.host = host;
                entry.set_baseline(baseline);
                entry.host.clone()
            }
            None => {
                let mut entry = HostEntry {
                    host,
                    machine: HostMachine::new(),
                    window: ProbeWindow::default(),
                    last_probe_at: None,
                    retired: false,
                };
                entry.set_baseline(baseline);
                let registered = entry.host.clone();
                self.hosts
                    .write()
                    .await
                    .insert(registered.service_id.clone(), Arc::new(Mutex::new(entry)));
                registered
            }
        };

        tracing::info!(
            service_id = %registered.service_id,
            baseline = %baseline,
            auto_status_change = registered.auto_status_change,
            "Monitored host registered"
        );
        self.publish_snapshot(&registered.service_id).await;
        registered
    }

    pub async fn unregister(&self, service_id: &str) -> Option<MonitoredHost> {
        let entry = self.hosts.write().await.remove(service_id)?;
        let mut entry = entry.lock().await;
        entry.retired = true;
        let host = entry.host.clone();
        drop(entry);

        // Observers of the readout channel see their stream end.
        self.hub.unregister_monitor(service_id).await;
        tracing::info!(service_id = %service_id, "Monitored host unregistered");
        Some(host)
    }

    /// Flip the auto-status-change flag. Resets the baseline like any other
    /// manual change.
    pub async fn set_auto_status_change(
        &self,
        service_id: &str,
        enabled: bool,
    ) -> Result<MonitoredHost, CoreError> {
        let baseline = self.baseline_for(service_id).await;
        let entry = self.entry(service_id).await?;
        let host = {
            let mut entry = entry.lock().await;
            entry.host.auto_status_change = enabled;
            entry.set_baseline(baseline);
            entry.host.clone()
        };
        self.publish_snapshot(service_id).await;
        Ok(host)
    }

    /// Switch probing on or off for a registered host. Only the stored flag
    /// changes here; starting and stopping the probe loop is the caller's
    /// job.
    pub async fn set_probing(
        &self,
        service_id: &str,
        is_active: bool,
    ) -> Result<MonitoredHost, CoreError> {
        let baseline = self.baseline_for(service_id).await;
        let entry = self.entry(service_id).await?;
        let host = {
            let mut entry = entry.lock().await;
            entry.host.is_active = is_active;
            entry.set_baseline(baseline);
            entry.host.clone()
        };
        self.publish_snapshot(service_id).await;
        Ok(host)
    }

    /// Force the state the next probe is compared against.
    pub async fn reset_baseline(
        &self,
        service_id: &str,
        state: Reachability,
    ) -> Result<(), CoreError> {
        let entry = self.entry(service_id).await?;
        entry.lock().await.set_baseline(state);
        tracing::info!(service_id = %service_id, baseline = %state, "Baseline reset");
        Ok(())
    }

    pub async fn host(&self, service_id: &str) -> Option<MonitoredHost> {
        let entry = self.hosts.read().await.get(service_id).cloned()?;
        let host = entry.lock().await.host.clone();
        Some(host)
    }

    /// All registered hosts, ordered by service id.
    pub async fn hosts(&self) -> Vec<MonitoredHost> {
        let entries: Vec<_> = self.hosts.read().await.values().cloned().collect();
        let mut hosts = Vec::with_capacity(entries.len());
        for entry in entries {
            hosts.push(entry.lock().await.host.clone());
        }
        hosts.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        hosts
    }

    pub async fn snapshot(&self, service_id: &str) -> Option<MonitorSnapshot> {
        let entry = self.hosts.read().await.get(service_id).cloned()?;
        let snapshot = entry.lock().await.snapshot();
        Some(snapshot)
    }

    pub async fn host_count(&self) -> usize {
        self.hosts.read().await.len()
    }

    /// Apply one probe result.
    pub async fn on_probe_result(&self, result: ProbeResult) {
        let Some(entry) = self.hosts.read().await.get(&result.service_id).cloned() else {
            tracing::debug!(service_id = %result.service_id, "Result for unknown host discarded");
            return;
        };

        let mut entry = entry.lock().await;
        if entry.retired {
            return;
        }

        entry.window.record(result.success, result.round_trip_ms);
        entry.last_probe_at = Some(result.observed_at);

        if let Some(transition) = entry.machine.observe(result.success, result.observed_at) {
            entry.host.currently_active = transition.to.is_active();
            tracing::info!(
                service_id = %result.service_id,
                hostname = %entry.host.hostname,
                from = %transition.from,
                to = %transition.to,
                "Host reachability changed"
            );
            self.apply_transition(&entry.host, transition).await;
        }

        self.publish(&entry.host.service_id, entry.snapshot()).await;
    }

    // ---- private helpers ----

    async fn entry(&self, service_id: &str) -> Result<Arc<Mutex<HostEntry>>, CoreError> {
        self.hosts
            .read()
            .await
            .get(service_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound {
                entity: "MonitoredHost",
                id: service_id.to_string(),
            })
    }

    async fn apply_transition(&self, host: &MonitoredHost, transition: Transition) {
        let mut location = None;
        if host.auto_status_change {
            location = self.rewrite_equipment_status(host, transition).await;
        }
        let location = match location {
            Some(location) => Some(location),
            None => self.locate(&host.service_id).await,
        };

        let entry = transition_entry(location.as_ref(), transition);
        if let Err(e) = self.event_log.record_system(entry).await {
            tracing::error!(
                service_id = %host.service_id,
                error = %e,
                "Failed to record transition in event log"
            );
        }
    }

    /// Set the service's status on the equipment channel. Returns where the
    /// service lives if it was changed.
    async fn rewrite_equipment_status(
        &self,
        host: &MonitoredHost,
        transition: Transition,
    ) -> Option<ServiceLocation> {
        let mut changed = None;
        let result = self
            .hub
            .modify(&Channel::EquipmentGroups, &Writer::system(), |current| {
                let mut groups = decode_groups(current)?;
                let Some(location) = apply_service_status(
                    &mut groups,
                    &host.service_id,
                    transition.to.status_value(),
                    transition.to.status_color(),
                    transition.observed_at,
                ) else {
                    return Ok(None);
                };
                changed = Some(location);
                serde_json::to_value(&groups)
                    .map(Some)
                    .map_err(|e| CoreError::Internal(e.to_string()))
            })
            .await;

        match result {
            Ok(Some(version)) => {
                tracing::info!(
                    service_id = %host.service_id,
                    status = transition.to.status_value(),
                    version,
                    "Equipment status updated from monitoring"
                );
            }
            Ok(None) => {
                tracing::debug!(
                    service_id = %host.service_id,
                    "No equipment change needed for transition"
                );
            }
            Err(e) => {
                tracing::error!(
                    service_id = %host.service_id,
                    error = %e,
                    "Failed to update equipment status"
                );
            }
        }
        changed
    }

    async fn locate(&self, service_id: &str) -> Option<ServiceLocation> {
        let snapshot = self.hub.snapshot(&Channel::EquipmentGroups).await;
        let groups = decode_groups(&snapshot.value).ok()?;
        find_service(&groups, service_id)
    }

    /// The equipment service's current status, when it maps to a state.
    async fn baseline_for(&self, service_id: &str) -> Reachability {
        self.locate(service_id)
            .await
            .and_then(|location| Reachability::from_status(&location.status))
            .unwrap_or_default()
    }

    async fn publish_snapshot(&self, service_id: &str) {
        let Some(entry) = self.hosts.read().await.get(service_id).cloned() else {
            return;
        };
        let entry = entry.lock().await;
        self.publish(service_id, entry.snapshot()).await;
    }

    /// Publish a readout. Caller holds the host's lock.
    async fn publish(&self, service_id: &str, snapshot: MonitorSnapshot) {
        let value = match serde_json::to_value(&snapshot) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(service_id = %service_id, error = %e, "Failed to encode monitor snapshot");
                return;
            }
        };
        if let Err(e) = self
            .hub
            .publish(&Channel::monitor(service_id), value, &Writer::system())
            .await
        {
            tracing::warn!(service_id = %service_id, error = %e, "Failed to publish monitor snapshot");
        }
    }
}

#[async_trait]
impl ProbeSink for StatusTransitionEngine {
    async fn record(&self, result: ProbeResult) {
        self.on_probe_result(result).await;
    }
}

fn decode_groups(value: &serde_json::Value) -> Result<Vec<EquipmentGroup>, CoreError> {
    serde_json::from_value(value.clone())
        .map_err(|e| CoreError::Internal(format!("corrupt equipment groups: {e}")))
}

/// The event log entry recorded for a transition.
fn transition_entry(location: Option<&ServiceLocation>, transition: Transition) -> EventLogEntry {
    let category = match location {
        Some(location) => [
            MONITORING_CATEGORY,
            location.group_name.as_str(),
            location.service_label.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" "),
        None => MONITORING_CATEGORY.to_string(),
    };
    EventLogEntry::system(
        EventLevel::Alert,
        category,
        format!("Status updated to **{}**.", transition.to),
        format!(
            "Previous status: {}. Updated from continuous polling.",
            transition.from
        ),
    )
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use opswatch_events::{AllowAll, ChannelStore};
    use serde_json::json;

    use super::*;

    struct Fixture {
        hub: Arc<BroadcastHub>,
        log: Arc<EventLog>,
        engine: StatusTransitionEngine,
    }

    async fn fixture(groups: serde_json::Value) -> Fixture {
        let hub = Arc::new(BroadcastHub::new(
            Arc::new(ChannelStore::default()),
            Arc::new(AllowAll),
        ));
        hub.publish(&Channel::EquipmentGroups, groups, &Writer::system())
            .await
            .unwrap();
        let log = Arc::new(EventLog::new(Arc::clone(&hub), 100));
        let engine = StatusTransitionEngine::new(Arc::clone(&hub), Arc::clone(&log));
        Fixture { hub, log, engine }
    }

    fn groups(status: &str) -> serde_json::Value {
        json!([{
            "id": "g1",
            "name": "Comms",
            "services": [{
                "id": "svc-1",
                "enclave": "NIPR",
                "serviceName": "DNS",
                "status": status,
                "notes": "",
                "owner": "S6"
            }]
        }])
    }

    fn host(auto: bool) -> MonitoredHost {
        MonitoredHost {
            service_id: "svc-1".into(),
            hostname: "8.8.8.8".into(),
            interval_ms: 5_000,
            timeout_ms: 1_000,
            auto_status_change: auto,
            currently_active: true,
            is_active: true,
        }
    }

    fn probe(success: bool) -> ProbeResult {
        ProbeResult {
            service_id: "svc-1".into(),
            success,
            round_trip_ms: success.then_some(12.0),
            observed_at: Utc::now(),
        }
    }

    async fn service_status(hub: &BroadcastHub) -> serde_json::Value {
        hub.snapshot(&Channel::EquipmentGroups).await.value[0]["services"][0].clone()
    }

    #[tokio::test]
    async fn fail_fail_succeed_fires_two_transitions() {
        let f = fixture(groups("active")).await;
        f.engine.register(host(true)).await;

        for ok in [false, false, true] {
            f.engine.on_probe_result(probe(ok)).await;
        }

        let entries = f.log.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Status updated to **Active**.");
        assert_eq!(entries[1].title, "Status updated to **Inactive**.");
        assert_eq!(
            entries[1].message,
            "Previous status: Active. Updated from continuous polling."
        );
        assert!(entries.iter().all(|e| !e.is_user_generated && e.level == EventLevel::Alert));
        assert_eq!(entries[0].category, "Monitoring Comms NIPR DNS");

        let service = service_status(&f.hub).await;
        assert_eq!(service["status"], "active");
        assert_eq!(service["statusColor"], "success");
        assert_eq!(service["history"].as_array().unwrap().len(), 2);
        assert_eq!(service["history"][0]["status"], "inactive");
        assert_eq!(service["owner"], "S6");
    }

    #[tokio::test]
    async fn identical_results_produce_no_effects() {
        let f = fixture(groups("active")).await;
        f.engine.register(host(true)).await;
        let version = f.hub.snapshot(&Channel::EquipmentGroups).await.version;

        for _ in 0..5 {
            f.engine.on_probe_result(probe(true)).await;
        }

        assert!(f.log.list().await.unwrap().is_empty());
        assert_eq!(f.hub.snapshot(&Channel::EquipmentGroups).await.version, version);
    }

    #[tokio::test]
    async fn auto_off_logs_without_touching_equipment() {
        let f = fixture(groups("active")).await;
        f.engine.register(host(false)).await;
        let version = f.hub.snapshot(&Channel::EquipmentGroups).await.version;

        f.engine.on_probe_result(probe(false)).await;

        assert_eq!(f.log.list().await.unwrap().len(), 1);
        assert_eq!(f.hub.snapshot(&Channel::EquipmentGroups).await.version, version);
        assert_eq!(service_status(&f.hub).await["status"], "active");
    }

    #[tokio::test]
    async fn operator_status_becomes_baseline() {
        let f = fixture(groups("inactive")).await;
        let registered = f.engine.register(host(true)).await;
        assert!(!registered.currently_active);

        // Failure matches the operator's state: nothing happens.
        f.engine.on_probe_result(probe(false)).await;
        assert!(f.log.list().await.unwrap().is_empty());

        f.engine.on_probe_result(probe(true)).await;
        assert_eq!(f.log.list().await.unwrap().len(), 1);
        assert_eq!(service_status(&f.hub).await["status"], "active");
    }

    #[tokio::test]
    async fn toggling_auto_resets_baseline() {
        let f = fixture(groups("active")).await;
        f.engine.register(host(false)).await;
        f.engine.on_probe_result(probe(false)).await;
        assert!(!f.engine.host("svc-1").await.unwrap().currently_active);

        // Equipment still says active, so that is the new baseline.
        let host = f.engine.set_auto_status_change("svc-1", true).await.unwrap();
        assert!(host.currently_active);

        f.engine.on_probe_result(probe(false)).await;
        assert_eq!(service_status(&f.hub).await["status"], "inactive");
        assert_eq!(f.log.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn every_result_publishes_live_readout() {
        let f = fixture(groups("active")).await;
        f.engine.register(host(false)).await;
        let mut observer = f.hub.attach(&Channel::monitor("svc-1")).await.unwrap();

        f.engine.on_probe_result(probe(true)).await;
        f.engine.on_probe_result(probe(true)).await;

        let first = observer.updates.recv().await.unwrap();
        let second = observer.updates.recv().await.unwrap();
        assert_eq!(first.value["pingResults"], json!([true]));
        assert_eq!(second.value["pingResults"], json!([true, true]));
        assert_eq!(second.value["averageResponseTime"], 12.0);
        assert_eq!(second.value["status"], "Active");
    }

    #[tokio::test]
    async fn unknown_service_logs_with_plain_category() {
        let f = fixture(json!([])).await;
        f.engine.register(host(true)).await;
        f.engine.on_probe_result(probe(false)).await;

        let entries = f.log.list().await.unwrap();
        assert_eq!(entries[0].category, MONITORING_CATEGORY);
    }

    #[tokio::test]
    async fn results_after_unregister_are_dropped() {
        let f = fixture(groups("active")).await;
        f.engine.register(host(true)).await;
        let mut observer = f.hub.attach(&Channel::monitor("svc-1")).await.unwrap();
        assert!(f.engine.unregister("svc-1").await.is_some());

        f.engine.on_probe_result(probe(false)).await;
        assert!(f.log.list().await.unwrap().is_empty());
        assert!(f.engine.unregister("svc-1").await.is_none());

        // The readout channel closed with the host.
        assert!(observer.updates.recv().await.is_none());
        assert_matches!(
            f.hub.attach(&Channel::monitor("svc-1")).await,
            Err(CoreError::UnknownChannel(_))
        );
    }

    #[tokio::test]
    async fn readout_channel_opens_on_register() {
        let f = fixture(groups("active")).await;
        assert!(f.hub.attach(&Channel::monitor("svc-1")).await.is_err());

        f.engine.register(host(false)).await;
        let observer = f.hub.attach(&Channel::monitor("svc-1")).await.unwrap();
        assert_eq!(observer.snapshot.version, 1);
        assert_eq!(observer.snapshot.value["hostname"], "8.8.8.8");
    }
}
