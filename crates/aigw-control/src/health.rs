//! Health monitoring
//!
//! One probe cycle hits every known backend concurrently, each probe
//! under its own timeout, then folds the results into per-backend
//! hysteresis trackers. The readiness probe is only attempted when the
//! liveness probe succeeded; a dead process cannot be ready.

use std::collections::HashMap;

use aigw_core::{
    BackendRecord, HealthState, HealthThresholds, HealthTracker, ProbeReport, Transition,
};
use aigw_client::BackendClient;
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::HealthConfig;

/// Runs probe cycles and owns the per-backend trackers.
pub struct HealthMonitor {
    config: HealthConfig,
    thresholds: HealthThresholds,
    trackers: HashMap<String, HealthTracker>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        let thresholds = config.thresholds();
        Self {
            config,
            thresholds,
            trackers: HashMap::new(),
        }
    }

    /// Last computed state for `backend`, unknown if never probed.
    pub fn state(&self, backend: &str) -> HealthState {
        self.trackers
            .get(backend)
            .map(|t| t.state().clone())
            .unwrap_or_else(|| HealthState::unknown(backend))
    }

    /// Drop trackers for backends no longer in the registry.
    pub fn retain(&mut self, names: &[String]) {
        self.trackers.retain(|name, _| names.contains(name));
    }

    /// Probe all `records` concurrently and fold the results.
    ///
    /// Returns the transitions this cycle caused, by backend name.
    pub async fn probe_cycle(&mut self, records: &[BackendRecord]) -> Vec<(String, Transition)> {
        let probes = records.iter().map(|record| {
            let liveness_timeout = self.config.liveness_timeout();
            let readiness_timeout = self.config.readiness_timeout();
            async move {
                let report = probe_backend(record, liveness_timeout, readiness_timeout).await;
                (record.name.clone(), report)
            }
        });

        let reports = join_all(probes).await;
        let now = Utc::now();
        let mut transitions = Vec::new();

        for (name, report) in reports {
            let tracker = self
                .trackers
                .entry(name.clone())
                .or_insert_with(|| HealthTracker::new(&name, self.thresholds));

            if let Some(transition) = tracker.observe(report, now) {
                match transition {
                    Transition::BecameHealthy => info!(backend = %name, "backend healthy"),
                    Transition::BecameUnhealthy => {
                        warn!(backend = %name, error = ?tracker.state().last_error, "backend unhealthy")
                    }
                    Transition::ReadinessChanged => {
                        info!(backend = %name, ready = ?tracker.state().ready, "backend readiness changed")
                    }
                }
                transitions.push((name, transition));
            } else {
                debug!(backend = %name, healthy = ?tracker.state().healthy, "probe cycle complete");
            }
        }

        transitions
    }
}

async fn probe_backend(
    record: &BackendRecord,
    liveness_timeout: std::time::Duration,
    readiness_timeout: std::time::Duration,
) -> ProbeReport {
    let client = match BackendClient::new(record) {
        Ok(client) => client,
        Err(e) => {
            return ProbeReport {
                live: Err(e.to_string()),
                ready: None,
            }
        }
    };

    match client.probe_liveness(liveness_timeout).await {
        Ok(()) => {
            let ready = client.probe_readiness(readiness_timeout).await;
            ProbeReport {
                live: Ok(()),
                ready: Some(ready),
            }
        }
        Err(e) => ProbeReport {
            live: Err(e.to_string()),
            ready: None,
        },
    }
}
