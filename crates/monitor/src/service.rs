//! Monitoring configuration surface.
//!
//! [`MonitorService`] ties the transition engine to the probe scheduler:
//! the engine owns each host's state, the scheduler owns its probe loop.
//! Callers only ever go through this type, so the two never disagree about
//! which hosts exist.

use std::sync::Arc;

use opswatch_core::error::CoreError;
use opswatch_core::monitoring::{MonitorSettings, MonitorSnapshot, MonitoredHost};
use opswatch_events::{BroadcastHub, EventLog};

use crate::engine::StatusTransitionEngine;
use crate::probe::Prober;
use crate::scheduler::{ProbeScheduler, ProbeSink};

pub struct MonitorService {
    engine: Arc<StatusTransitionEngine>,
    scheduler: ProbeScheduler,
}

impl MonitorService {
    pub fn new(hub: Arc<BroadcastHub>, event_log: Arc<EventLog>, prober: Arc<dyn Prober>) -> Self {
        let engine = Arc::new(StatusTransitionEngine::new(hub, event_log));
        let sink: Arc<dyn ProbeSink> = engine.clone();
        Self {
            scheduler: ProbeScheduler::new(prober, sink),
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<StatusTransitionEngine> {
        &self.engine
    }

    /// Create or replace the monitoring configuration of one service.
    ///
    /// With `is_active` set the host is probed, starting immediately; a
    /// running loop for the same hostname just picks up the new schedule
    /// on its next tick. With `is_active` cleared the loop is stopped but
    /// the host stays registered.
    pub async fn configure(
        &self,
        service_id: &str,
        settings: MonitorSettings,
    ) -> Result<MonitoredHost, CoreError> {
        if service_id.trim().is_empty() {
            return Err(CoreError::Validation("service id must not be empty".into()));
        }
        settings.validate()?;

        let host = self
            .engine
            .register(MonitoredHost::new(service_id, &settings))
            .await;

        if host.is_active {
            let same_target = self.scheduler.hostname(service_id).await.as_deref()
                == Some(host.hostname.as_str());
            if same_target {
                self.scheduler
                    .update_schedule(service_id, host.interval_ms, host.timeout_ms)
                    .await?;
            } else {
                self.scheduler.start_monitoring(&host).await?;
            }
        } else {
            self.scheduler.stop_monitoring(service_id).await;
        }
        Ok(host)
    }

    /// Turn probing on or off without changing the rest of the settings.
    pub async fn set_active(
        &self,
        service_id: &str,
        is_active: bool,
    ) -> Result<MonitoredHost, CoreError> {
        let host = self.engine.set_probing(service_id, is_active).await?;
        if is_active {
            if !self.scheduler.is_running(service_id).await {
                self.scheduler.start_monitoring(&host).await?;
            }
        } else {
            self.scheduler.stop_monitoring(service_id).await;
        }
        Ok(host)
    }

    pub async fn set_auto_status_change(
        &self,
        service_id: &str,
        enabled: bool,
    ) -> Result<MonitoredHost, CoreError> {
        self.engine.set_auto_status_change(service_id, enabled).await
    }

    /// Stop probing and forget the host.
    pub async fn remove(&self, service_id: &str) -> Result<MonitoredHost, CoreError> {
        self.scheduler.stop_monitoring(service_id).await;
        self.engine
            .unregister(service_id)
            .await
            .ok_or_else(|| CoreError::NotFound {
                entity: "MonitoredHost",
                id: service_id.to_string(),
            })
    }

    pub async fn list(&self) -> Vec<MonitoredHost> {
        self.engine.hosts().await
    }

    pub async fn get(&self, service_id: &str) -> Option<MonitoredHost> {
        self.engine.host(service_id).await
    }

    pub async fn snapshot(&self, service_id: &str) -> Option<MonitorSnapshot> {
        self.engine.snapshot(service_id).await
    }

    pub async fn host_count(&self) -> usize {
        self.engine.host_count().await
    }

    /// Number of hosts with a live probe loop.
    pub async fn probing_count(&self) -> usize {
        self.scheduler.running_count().await
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
