//! Control plane loop
//!
//! A single writer task owns all mutable state (registry view, health
//! trackers, descriptor cache). After every registry poll or probe
//! cycle it rebuilds the routing table from scratch and publishes it
//! through an atomic pointer swap; request handlers only ever read
//! published snapshots and never contend with the writer.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use aigw_core::{Alias, RoutingEntry, RoutingTable, RoutingTableBuilder, Transition};
use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::descriptor::DescriptorCache;
use crate::health::HealthMonitor;
use crate::source::{EtcdSource, RegistryAdapter, RegistrySource};

/// Shared read handle to the current routing table.
///
/// Cloning is cheap; every clone observes the same swaps.
#[derive(Clone)]
pub struct SnapshotHandle {
    table: Arc<ArcSwap<RoutingTable>>,
}

impl SnapshotHandle {
    /// A handle starting at the empty generation-zero table.
    pub fn new() -> Self {
        Self {
            table: Arc::new(ArcSwap::from_pointee(RoutingTable::empty())),
        }
    }

    /// The current snapshot. Lock-free; safe to call per request.
    pub fn load(&self) -> Arc<RoutingTable> {
        self.table.load_full()
    }

    /// Whether at least one table has been built since startup.
    pub fn is_ready(&self) -> bool {
        self.table.load().generation > 0
    }

    fn publish(&self, table: RoutingTable) {
        self.table.store(Arc::new(table));
    }
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns discovery, health, and descriptor state; publishes snapshots.
pub struct ControlPlane {
    config: GatewayConfig,
    adapter: RegistryAdapter,
    monitor: HealthMonitor,
    descriptors: DescriptorCache,
    handle: SnapshotHandle,
    aliases: Vec<Alias>,
    generation: u64,
    // Gauges survive table rebuilds so declared-capacity checks see
    // requests admitted under previous generations.
    gauges: HashMap<String, Arc<AtomicUsize>>,
}

impl ControlPlane {
    pub fn new(config: GatewayConfig) -> Self {
        let source: Option<Box<dyn RegistrySource>> = config
            .registry
            .etcd
            .clone()
            .map(|etcd| Box::new(EtcdSource::new(etcd)) as Box<dyn RegistrySource>);

        let adapter = RegistryAdapter::new(
            source,
            config.backends.clone(),
            config.registry.grace_polls,
        );
        let monitor = HealthMonitor::new(config.health.clone());
        let descriptors =
            DescriptorCache::new(config.descriptor.ttl(), config.descriptor.timeout());
        let aliases = config.aliases();

        Self {
            config,
            adapter,
            monitor,
            descriptors,
            handle: SnapshotHandle::new(),
            aliases,
            generation: 0,
            gauges: HashMap::new(),
        }
    }

    /// Read handle for request handlers.
    pub fn handle(&self) -> SnapshotHandle {
        self.handle.clone()
    }

    /// Run until `shutdown` flips to true. Both intervals fire
    /// immediately on startup so the first snapshot appears after one
    /// poll plus one probe cycle, not after a full interval.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut poll_interval = tokio::time::interval(self.config.registry.poll_interval());
        let mut probe_interval = tokio::time::interval(self.config.health.interval());

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    self.poll_registry().await;
                    self.rebuild().await;
                }
                _ = probe_interval.tick() => {
                    self.probe_health().await;
                    self.rebuild().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("control plane shutting down");
                        return;
                    }
                }
            }
        }
    }

    async fn poll_registry(&mut self) {
        let records = self.adapter.poll(Utc::now()).await;
        let names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();

        // Forget state for pruned backends.
        self.monitor.retain(&names);
        self.descriptors.retain(&names);
        self.gauges.retain(|name, _| names.contains(name));

        for alias in &self.aliases {
            if !names.contains(&alias.backend) {
                debug!(alias = %alias.name, backend = %alias.backend, "alias target not currently registered");
            }
        }
    }

    async fn probe_health(&mut self) {
        let records = self.adapter.records();
        let transitions = self.monitor.probe_cycle(&records).await;

        for (backend, transition) in transitions {
            // A restarted backend may advertise different capabilities.
            if transition == Transition::BecameHealthy {
                self.descriptors.invalidate(&backend);
            }
        }
    }

    /// Build and publish the next snapshot from the current view.
    async fn rebuild(&mut self) {
        let records = self.adapter.records();
        let descriptors = self.descriptors.refresh(&records).await;

        self.generation += 1;
        let mut builder = RoutingTableBuilder::new(self.generation);

        for record in records {
            let descriptor = descriptors.get(&record.name).cloned().flatten();
            let health = self.monitor.state(&record.name);
            let aliases: Vec<Alias> = self
                .aliases
                .iter()
                .filter(|a| a.backend == record.name)
                .cloned()
                .collect();
            let in_flight = self
                .gauges
                .entry(record.name.clone())
                .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
                .clone();

            if descriptor.is_none() {
                warn!(backend = %record.name, "capabilities unknown, backend excluded from routing");
            }

            builder.push(RoutingEntry {
                record,
                descriptor,
                health,
                aliases,
                in_flight,
            });
        }

        let table = builder.build();
        debug!(
            generation = table.generation,
            backends = table.entries().len(),
            "published routing table"
        );
        self.handle.publish(table);
    }
}
