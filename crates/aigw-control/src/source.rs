//! Registry discovery
//!
//! Backends announce themselves as JSON values under a key prefix in
//! etcd; statically configured backends are merged in on every poll.
//! The adapter keeps the last good view when the registry is
//! unreachable and only prunes a dynamic backend after it has been
//! absent for a configured number of consecutive polls.

use std::collections::HashMap;

use aigw_core::{BackendRecord, RecordSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use etcd_client::{Client, ConnectOptions, GetOptions};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{EtcdConfig, StaticBackendConfig};
use crate::error::{ControlError, ControlResult};

/// A backend announcement as stored in the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryDoc {
    pub name: String,
    pub base_url: String,
    /// Defaults to `{base_url}/v1/metadata`
    pub metadata_url: Option<String>,
}

impl RegistryDoc {
    fn metadata_url(&self) -> String {
        self.metadata_url.clone().unwrap_or_else(|| {
            format!("{}/v1/metadata", self.base_url.trim_end_matches('/'))
        })
    }
}

/// A source of backend announcements, polled by the control plane.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// One full listing of currently announced backends.
    async fn fetch(&mut self) -> ControlResult<Vec<RegistryDoc>>;
}

/// etcd-backed source: lists all keys under the configured prefix.
/// The client is recreated on the next poll after any failure.
pub struct EtcdSource {
    config: EtcdConfig,
    client: Option<Client>,
}

impl EtcdSource {
    pub fn new(config: EtcdConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    async fn ensure_client(&mut self) -> ControlResult<&mut Client> {
        if self.client.is_none() {
            info!(endpoints = ?self.config.endpoints, "connecting to registry");
            let options = ConnectOptions::default()
                .with_timeout(self.config.timeout())
                .with_connect_timeout(self.config.connect_timeout());
            let client = Client::connect(self.config.endpoints.clone(), Some(options)).await?;
            self.client = Some(client);
        }
        self.client
            .as_mut()
            .ok_or_else(|| ControlError::Registry("registry client not connected".to_string()))
    }
}

#[async_trait]
impl RegistrySource for EtcdSource {
    async fn fetch(&mut self) -> ControlResult<Vec<RegistryDoc>> {
        let prefix = self.config.prefix.clone();
        let client = self.ensure_client().await?;

        let response = match client
            .get(prefix.as_bytes(), Some(GetOptions::new().with_prefix()))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // Reset so the next poll reconnects from scratch.
                self.client = None;
                return Err(e.into());
            }
        };

        let mut docs = Vec::new();
        for kv in response.kvs() {
            let key = String::from_utf8_lossy(kv.key()).to_string();
            match serde_json::from_slice::<RegistryDoc>(kv.value()) {
                Ok(doc) => docs.push(doc),
                Err(e) => {
                    // One bad value must not poison the listing.
                    warn!(key = %key, error = %e, "skipping malformed registry value");
                }
            }
        }

        Ok(docs)
    }
}

/// Tracks presence across polls and applies the absence grace period.
pub struct RegistryAdapter {
    source: Option<Box<dyn RegistrySource>>,
    static_backends: Vec<StaticBackendConfig>,
    grace_polls: u32,
    known: HashMap<String, BackendRecord>,
    missed: HashMap<String, u32>,
}

impl RegistryAdapter {
    pub fn new(
        source: Option<Box<dyn RegistrySource>>,
        static_backends: Vec<StaticBackendConfig>,
        grace_polls: u32,
    ) -> Self {
        Self {
            source,
            static_backends,
            grace_polls,
            known: HashMap::new(),
            missed: HashMap::new(),
        }
    }

    /// Last known records, in stable registration order.
    pub fn records(&self) -> Vec<BackendRecord> {
        let mut records: Vec<BackendRecord> = self.known.values().cloned().collect();
        records
            .sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.name.cmp(&b.name)));
        records
    }

    /// Run one poll cycle: merge the static set with the registry
    /// listing, refresh `last_seen`, and prune dynamic backends absent
    /// for more than the grace period.
    ///
    /// A registry fetch failure keeps the previous view intact and
    /// does not count toward absence.
    pub async fn poll(&mut self, now: DateTime<Utc>) -> Vec<BackendRecord> {
        let mut seen: Vec<(RegistryDoc, RecordSource)> = self
            .static_backends
            .iter()
            .map(|b| {
                (
                    RegistryDoc {
                        name: b.name.clone(),
                        base_url: b.base_url.clone(),
                        metadata_url: Some(b.metadata_url()),
                    },
                    RecordSource::Static,
                )
            })
            .collect();

        let mut listing_ok = true;
        if let Some(source) = self.source.as_mut() {
            match source.fetch().await {
                Ok(docs) => {
                    for doc in docs {
                        seen.push((doc, RecordSource::Dynamic));
                    }
                }
                Err(e) => {
                    listing_ok = false;
                    warn!(error = %e, "registry poll failed, keeping last known backends");
                }
            }
        }

        for (doc, source) in seen {
            self.missed.remove(&doc.name);
            match self.known.get_mut(&doc.name) {
                Some(record) => {
                    record.last_seen = now;
                    record.base_url = doc.base_url.clone();
                    record.metadata_url = doc.metadata_url();
                }
                None => {
                    info!(backend = %doc.name, source = ?source, "backend discovered");
                    let mut record =
                        BackendRecord::new(&doc.name, &doc.base_url, doc.metadata_url(), source);
                    record.first_seen = now;
                    record.last_seen = now;
                    self.known.insert(doc.name.clone(), record);
                }
            }
        }

        if listing_ok {
            let mut pruned = Vec::new();
            for (name, record) in &self.known {
                if record.source == RecordSource::Static || record.last_seen == now {
                    continue;
                }
                let missed = self.missed.entry(name.clone()).or_insert(0);
                *missed += 1;
                debug!(backend = %name, missed = *missed, "backend absent from registry");
                if *missed >= self.grace_polls {
                    pruned.push(name.clone());
                }
            }
            for name in pruned {
                info!(backend = %name, "pruning backend absent past grace period");
                self.known.remove(&name);
                self.missed.remove(&name);
            }
        }

        self.records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct ScriptedSource {
        polls: Vec<ControlResult<Vec<RegistryDoc>>>,
    }

    #[async_trait]
    impl RegistrySource for ScriptedSource {
        async fn fetch(&mut self) -> ControlResult<Vec<RegistryDoc>> {
            if self.polls.is_empty() {
                Ok(Vec::new())
            } else {
                self.polls.remove(0)
            }
        }
    }

    fn doc(name: &str) -> RegistryDoc {
        RegistryDoc {
            name: name.to_string(),
            base_url: format!("http://{name}.local"),
            metadata_url: None,
        }
    }

    fn names(records: &[BackendRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_discovery_merges_static_and_dynamic() {
        let source = ScriptedSource {
            polls: vec![Ok(vec![doc("dyn")])],
        };
        let mut adapter = RegistryAdapter::new(
            Some(Box::new(source)),
            vec![StaticBackendConfig {
                name: "fixed".to_string(),
                base_url: "http://fixed.local".to_string(),
                metadata_url: None,
            }],
            3,
        );

        let records = adapter.poll(Utc::now()).await;
        let mut got = names(&records);
        got.sort();
        assert_eq!(got, vec!["dyn", "fixed"]);
    }

    #[tokio::test]
    async fn test_absent_backend_survives_grace_then_is_pruned() {
        let source = ScriptedSource {
            polls: vec![
                Ok(vec![doc("flaky")]),
                Ok(vec![]),
                Ok(vec![]),
                Ok(vec![]),
            ],
        };
        let mut adapter = RegistryAdapter::new(Some(Box::new(source)), Vec::new(), 3);

        assert_eq!(names(&adapter.poll(Utc::now()).await), vec!["flaky"]);
        // Two absences: still within grace.
        assert_eq!(names(&adapter.poll(Utc::now()).await), vec!["flaky"]);
        assert_eq!(names(&adapter.poll(Utc::now()).await), vec!["flaky"]);
        // Third consecutive absence: pruned.
        assert!(adapter.poll(Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_last_good_view() {
        let source = ScriptedSource {
            polls: vec![
                Ok(vec![doc("steady")]),
                Err(ControlError::Registry("registry down".to_string())),
                Err(ControlError::Registry("registry down".to_string())),
                Err(ControlError::Registry("registry down".to_string())),
                Err(ControlError::Registry("registry down".to_string())),
            ],
        };
        let mut adapter = RegistryAdapter::new(Some(Box::new(source)), Vec::new(), 3);

        adapter.poll(Utc::now()).await;
        // Failures never count toward absence, no matter how many.
        for _ in 0..4 {
            assert_eq!(names(&adapter.poll(Utc::now()).await), vec!["steady"]);
        }
    }

    #[tokio::test]
    async fn test_reappearance_resets_absence_count() {
        let source = ScriptedSource {
            polls: vec![
                Ok(vec![doc("blinky")]),
                Ok(vec![]),
                Ok(vec![]),
                Ok(vec![doc("blinky")]),
                Ok(vec![]),
                Ok(vec![]),
            ],
        };
        let mut adapter = RegistryAdapter::new(Some(Box::new(source)), Vec::new(), 3);

        for _ in 0..6 {
            assert_eq!(names(&adapter.poll(Utc::now()).await), vec!["blinky"]);
        }
    }

    #[tokio::test]
    async fn test_first_seen_is_stable_across_polls() {
        let source = ScriptedSource {
            polls: vec![Ok(vec![doc("a")]), Ok(vec![doc("a")])],
        };
        let mut adapter = RegistryAdapter::new(Some(Box::new(source)), Vec::new(), 3);

        let first = adapter.poll(Utc::now()).await[0].first_seen;
        let second = adapter.poll(Utc::now()).await[0].first_seen;
        assert_eq!(first, second);
    }
}
