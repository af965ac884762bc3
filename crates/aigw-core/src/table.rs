//! Immutable routing table snapshots
//!
//! A table is built in one pass from a coherent (registry, descriptor,
//! health) triple and then published by atomic pointer swap. Readers
//! always observe either the fully-old or the fully-new table; nothing
//! is ever mutated in place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::descriptor::CapabilityDescriptor;
use crate::models::domain::Domain;
use crate::models::health::HealthState;
use crate::models::record::BackendRecord;

/// An operator-defined alias mapping a public name to a backend and,
/// optionally, a concrete model on it. Aliases take priority over
/// domain-based selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    /// Public alias name
    pub name: String,
    /// Target backend name
    pub backend: String,
    /// Model to request from the target, if pinned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Read-only composite of everything known about one backend.
#[derive(Debug)]
pub struct RoutingEntry {
    /// Registry record
    pub record: BackendRecord,
    /// Advertised capabilities; `None` until a descriptor fetch succeeds
    pub descriptor: Option<CapabilityDescriptor>,
    /// Last computed health
    pub health: HealthState,
    /// Aliases resolving to this entry
    pub aliases: Vec<Alias>,
    /// Requests currently relayed through this backend. Shared across
    /// table generations so rebuilds do not reset the gauge.
    pub in_flight: Arc<AtomicUsize>,
}

impl RoutingEntry {
    /// Backend name.
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Eligibility for routing: healthy and ready.
    pub fn is_eligible(&self) -> bool {
        self.health.is_eligible()
    }

    /// Whether this backend advertises `domain`. A backend with no
    /// descriptor is invisible to capability-based routing.
    pub fn supports(&self, domain: &Domain) -> bool {
        self.descriptor
            .as_ref()
            .map(|d| d.supports(domain))
            .unwrap_or(false)
    }

    /// Whether the backend advertises streaming responses.
    pub fn streaming(&self) -> bool {
        self.descriptor.as_ref().map(|d| d.streaming).unwrap_or(false)
    }

    /// Whether declared capacity leaves room for one more request.
    pub fn has_headroom(&self) -> bool {
        match self.descriptor.as_ref().and_then(|d| d.max_concurrency) {
            Some(max) => self.in_flight.load(Ordering::Relaxed) < max as usize,
            None => true,
        }
    }
}

/// The current snapshot mapping domains and aliases to backends.
#[derive(Debug)]
pub struct RoutingTable {
    /// Monotonic rebuild counter
    pub generation: u64,
    /// When this snapshot was built
    pub built_at: DateTime<Utc>,
    entries: Vec<Arc<RoutingEntry>>,
    by_domain: HashMap<Domain, Vec<Arc<RoutingEntry>>>,
    by_alias: HashMap<String, Arc<RoutingEntry>>,
}

impl RoutingTable {
    /// An empty generation-zero table, used until the first rebuild.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            built_at: Utc::now(),
            entries: Vec::new(),
            by_domain: HashMap::new(),
            by_alias: HashMap::new(),
        }
    }

    /// All entries in stable registration order.
    pub fn entries(&self) -> &[Arc<RoutingEntry>] {
        &self.entries
    }

    /// Look up an entry by backend name.
    pub fn entry(&self, name: &str) -> Option<&Arc<RoutingEntry>> {
        self.entries.iter().find(|e| e.name() == name)
    }

    /// Resolve an alias to its entry, eligible or not.
    pub fn resolve_alias(&self, alias: &str) -> Option<&Arc<RoutingEntry>> {
        self.by_alias.get(alias)
    }

    /// Eligible entries for a domain, filtered by capacity headroom,
    /// in stable registration order.
    pub fn eligible_for(&self, domain: &Domain) -> Vec<Arc<RoutingEntry>> {
        self.by_domain
            .get(domain)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.is_eligible() && e.has_headroom())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Accumulates entries and produces a complete table in one step, so a
/// partially-populated table can never be observed.
pub struct RoutingTableBuilder {
    generation: u64,
    entries: Vec<Arc<RoutingEntry>>,
}

impl RoutingTableBuilder {
    /// Start building the table for `generation`.
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            entries: Vec::new(),
        }
    }

    /// Add one backend entry.
    pub fn push(&mut self, entry: RoutingEntry) -> &mut Self {
        self.entries.push(Arc::new(entry));
        self
    }

    /// Finish: sort deterministically and build the indexes.
    pub fn build(mut self) -> RoutingTable {
        // Deterministic tie-break: original registration time, then name.
        self.entries.sort_by(|a, b| {
            a.record
                .first_seen
                .cmp(&b.record.first_seen)
                .then_with(|| a.record.name.cmp(&b.record.name))
        });

        let mut by_domain: HashMap<Domain, Vec<Arc<RoutingEntry>>> = HashMap::new();
        let mut by_alias: HashMap<String, Arc<RoutingEntry>> = HashMap::new();

        for entry in &self.entries {
            if let Some(descriptor) = &entry.descriptor {
                for domain in &descriptor.domains {
                    by_domain
                        .entry(domain.clone())
                        .or_default()
                        .push(entry.clone());
                }
            }
            for alias in &entry.aliases {
                by_alias.insert(alias.name.clone(), entry.clone());
            }
        }

        RoutingTable {
            generation: self.generation,
            built_at: Utc::now(),
            entries: self.entries,
            by_domain,
            by_alias,
        }
    }
}
