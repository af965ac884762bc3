//! Health state and hysteresis
//!
//! Per-backend state machine: `unknown -> healthy` on a successful
//! liveness probe, `healthy -> ready` on a successful readiness probe,
//! any state `-> unhealthy` only after N consecutive probe failures,
//! and `unhealthy -> healthy` only after M consecutive successes. The
//! counters smooth out transient failures so routing does not flap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hysteresis thresholds for health transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Consecutive probe failures before a backend is marked unhealthy
    pub failure_threshold: u32,
    /// Consecutive successes before an unhealthy backend recovers
    pub recovery_threshold: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_threshold: 2,
        }
    }
}

/// Last computed health of a backend.
///
/// `healthy`/`ready` are `None` until the first conclusive probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthState {
    /// Backend this state belongs to
    pub backend: String,
    /// Liveness, or `None` if never probed conclusively
    pub healthy: Option<bool>,
    /// Readiness, or `None` if never probed conclusively
    pub ready: Option<bool>,
    /// Consecutive failed probes (reset on success)
    pub consecutive_failures: u32,
    /// Consecutive successful probes (reset on failure)
    pub consecutive_successes: u32,
    /// Time of the most recent probe
    pub last_check: Option<DateTime<Utc>>,
    /// Most recent probe error, if any
    pub last_error: Option<String>,
}

impl HealthState {
    /// State for a backend that has never been probed.
    pub fn unknown(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            healthy: None,
            ready: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_check: None,
            last_error: None,
        }
    }

    /// Whether this backend is eligible for routing.
    pub fn is_eligible(&self) -> bool {
        self.healthy == Some(true) && self.ready == Some(true)
    }
}

/// Outcome of one readiness probe
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyOutcome {
    /// 200 from /readyz
    Ready,
    /// 503 from /readyz: alive but not able to serve
    NotReady(String),
    /// The probe itself failed (timeout, connection refused, ...)
    Failed(String),
}

/// Outcome of one probe cycle against a backend
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    /// Liveness probe result
    pub live: Result<(), String>,
    /// Readiness probe result; `None` if the probe was skipped
    pub ready: Option<ReadyOutcome>,
}

/// A health transition worth acting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// unknown/unhealthy -> healthy (descriptor cache should be invalidated)
    BecameHealthy,
    /// -> unhealthy after the failure threshold was reached
    BecameUnhealthy,
    /// Readiness changed while healthy
    ReadinessChanged,
}

/// Applies the hysteresis rule to a stream of probe reports.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    state: HealthState,
    thresholds: HealthThresholds,
}

impl HealthTracker {
    /// Create a tracker in the `unknown` state.
    pub fn new(backend: impl Into<String>, thresholds: HealthThresholds) -> Self {
        Self {
            state: HealthState::unknown(backend),
            thresholds,
        }
    }

    /// The last computed state. Never blocks on a live probe.
    pub fn state(&self) -> &HealthState {
        &self.state
    }

    /// Fold one probe report into the state machine.
    ///
    /// Returns the transition this report caused, if any. A single
    /// probe result never flips liveness on its own except for the
    /// initial `unknown -> healthy` step.
    pub fn observe(&mut self, report: ProbeReport, at: DateTime<Utc>) -> Option<Transition> {
        self.state.last_check = Some(at);

        match report.live {
            Ok(()) => {
                self.state.consecutive_failures = 0;
                self.state.consecutive_successes += 1;
                self.state.last_error = None;

                let recovered = match self.state.healthy {
                    // First conclusive liveness result
                    None => true,
                    Some(false) => {
                        self.state.consecutive_successes >= self.thresholds.recovery_threshold
                    }
                    Some(true) => false,
                };

                if recovered {
                    self.state.healthy = Some(true);
                    self.apply_readiness(report.ready);
                    return Some(Transition::BecameHealthy);
                }
                if self.state.healthy == Some(true) {
                    let before = self.state.ready;
                    self.apply_readiness(report.ready);
                    if self.state.ready != before {
                        return Some(Transition::ReadinessChanged);
                    }
                }
                None
            }
            Err(e) => {
                self.state.consecutive_successes = 0;
                self.state.consecutive_failures += 1;
                self.state.last_error = Some(e);

                if self.state.healthy != Some(false)
                    && self.state.consecutive_failures >= self.thresholds.failure_threshold
                {
                    self.state.healthy = Some(false);
                    self.state.ready = Some(false);
                    return Some(Transition::BecameUnhealthy);
                }
                None
            }
        }
    }

    fn apply_readiness(&mut self, ready: Option<ReadyOutcome>) {
        match ready {
            Some(ReadyOutcome::Ready) => self.state.ready = Some(true),
            Some(ReadyOutcome::NotReady(reason)) => {
                self.state.ready = Some(false);
                self.state.last_error = Some(reason);
            }
            // A failed readiness probe is inconclusive: keep the last
            // computed value rather than flapping on one timeout.
            Some(ReadyOutcome::Failed(reason)) => {
                self.state.last_error = Some(reason);
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_report() -> ProbeReport {
        ProbeReport {
            live: Ok(()),
            ready: Some(ReadyOutcome::Ready),
        }
    }

    fn failed_report() -> ProbeReport {
        ProbeReport {
            live: Err("connection refused".to_string()),
            ready: None,
        }
    }

    #[test]
    fn test_unknown_becomes_healthy_on_first_success() {
        let mut t = HealthTracker::new("b", HealthThresholds::default());
        let tr = t.observe(ok_report(), Utc::now());
        assert_eq!(tr, Some(Transition::BecameHealthy));
        assert!(t.state().is_eligible());
    }

    #[test]
    fn test_fewer_than_n_failures_keep_backend_healthy() {
        let mut t = HealthTracker::new("b", HealthThresholds::default());
        t.observe(ok_report(), Utc::now());

        t.observe(failed_report(), Utc::now());
        t.observe(failed_report(), Utc::now());
        assert_eq!(t.state().healthy, Some(true));
        assert!(t.state().is_eligible());
    }

    #[test]
    fn test_n_failures_mark_unhealthy() {
        let mut t = HealthTracker::new("b", HealthThresholds::default());
        t.observe(ok_report(), Utc::now());

        t.observe(failed_report(), Utc::now());
        t.observe(failed_report(), Utc::now());
        let tr = t.observe(failed_report(), Utc::now());
        assert_eq!(tr, Some(Transition::BecameUnhealthy));
        assert_eq!(t.state().healthy, Some(false));
        assert!(!t.state().is_eligible());
    }

    #[test]
    fn test_recovery_needs_m_successes() {
        let mut t = HealthTracker::new("b", HealthThresholds::default());
        for _ in 0..3 {
            t.observe(failed_report(), Utc::now());
        }
        assert_eq!(t.state().healthy, Some(false));

        assert_eq!(t.observe(ok_report(), Utc::now()), None);
        assert_eq!(t.state().healthy, Some(false));

        let tr = t.observe(ok_report(), Utc::now());
        assert_eq!(tr, Some(Transition::BecameHealthy));
        assert!(t.state().is_eligible());
    }

    #[test]
    fn test_not_ready_response_flips_readiness_only() {
        let mut t = HealthTracker::new("b", HealthThresholds::default());
        t.observe(ok_report(), Utc::now());

        let tr = t.observe(
            ProbeReport {
                live: Ok(()),
                ready: Some(ReadyOutcome::NotReady("warming up".to_string())),
            },
            Utc::now(),
        );
        assert_eq!(tr, Some(Transition::ReadinessChanged));
        assert_eq!(t.state().healthy, Some(true));
        assert_eq!(t.state().ready, Some(false));
    }

    #[test]
    fn test_failed_readiness_probe_is_inconclusive() {
        let mut t = HealthTracker::new("b", HealthThresholds::default());
        t.observe(ok_report(), Utc::now());

        let tr = t.observe(
            ProbeReport {
                live: Ok(()),
                ready: Some(ReadyOutcome::Failed("timeout".to_string())),
            },
            Utc::now(),
        );
        assert_eq!(tr, None);
        assert_eq!(t.state().ready, Some(true));
    }
}
