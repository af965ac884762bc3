//! Capability descriptor cache
//!
//! Descriptors change rarely, so each backend's document is fetched at
//! most once per TTL, and all stale entries are refreshed concurrently
//! so one slow backend cannot delay the rebuild for the rest. A failed
//! fetch keeps any previously cached value rather than blanking the
//! backend's capabilities, and a backend that transitions back to
//! healthy gets its cache entry invalidated so the next rebuild
//! re-reads what it advertises now.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use aigw_client::{BackendClient, ClientResult};
use aigw_core::{BackendRecord, CapabilityDescriptor};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

/// Fetches one backend's capability document.
#[async_trait]
trait DescriptorSource: Send + Sync {
    async fn fetch(
        &self,
        record: &BackendRecord,
        timeout: Duration,
    ) -> ClientResult<CapabilityDescriptor>;
}

struct HttpSource;

#[async_trait]
impl DescriptorSource for HttpSource {
    async fn fetch(
        &self,
        record: &BackendRecord,
        timeout: Duration,
    ) -> ClientResult<CapabilityDescriptor> {
        let client = BackendClient::new(record)?;
        client.fetch_capabilities(timeout).await
    }
}

struct CacheSlot {
    descriptor: Option<CapabilityDescriptor>,
    fetched_at: Instant,
}

/// TTL cache of capability descriptors keyed by backend name.
pub struct DescriptorCache {
    ttl: Duration,
    timeout: Duration,
    source: Box<dyn DescriptorSource>,
    slots: HashMap<String, CacheSlot>,
}

impl DescriptorCache {
    pub fn new(ttl: Duration, timeout: Duration) -> Self {
        Self::with_source(ttl, timeout, Box::new(HttpSource))
    }

    fn with_source(ttl: Duration, timeout: Duration, source: Box<dyn DescriptorSource>) -> Self {
        Self {
            ttl,
            timeout,
            source,
            slots: HashMap::new(),
        }
    }

    /// Current descriptors for `records`, refetching every missing or
    /// stale entry. `None` means capabilities are still unknown.
    pub async fn refresh(
        &mut self,
        records: &[BackendRecord],
    ) -> HashMap<String, Option<CapabilityDescriptor>> {
        let mut current: HashMap<String, Option<CapabilityDescriptor>> = HashMap::new();
        let mut stale: Vec<&BackendRecord> = Vec::new();

        for record in records {
            match self.slots.get(&record.name) {
                Some(slot) if slot.fetched_at.elapsed() < self.ttl => {
                    current.insert(record.name.clone(), slot.descriptor.clone());
                }
                _ => stale.push(record),
            }
        }

        // All stale entries fetch concurrently, like the health probes;
        // a rebuild pays one timeout at most, not one per slow backend.
        let timeout = self.timeout;
        let source = self.source.as_ref();
        let fetches = stale.into_iter().map(|record| async move {
            let fetched = match source.fetch(record, timeout).await {
                Ok(descriptor) => {
                    debug!(backend = %record.name, domains = ?descriptor.domains, "descriptor refreshed");
                    Some(descriptor)
                }
                Err(e) => {
                    warn!(backend = %record.name, error = %e, "descriptor fetch failed");
                    None
                }
            };
            (record.name.clone(), fetched)
        });
        let results = join_all(fetches).await;

        for (name, fetched) in results {
            match fetched {
                Some(descriptor) => {
                    self.slots.insert(
                        name.clone(),
                        CacheSlot {
                            descriptor: Some(descriptor.clone()),
                            fetched_at: Instant::now(),
                        },
                    );
                    current.insert(name, Some(descriptor));
                }
                None => {
                    // Keep serving the stale value, but retry on the
                    // next rebuild instead of waiting out a full TTL.
                    let kept = self.slots.get(&name).and_then(|slot| slot.descriptor.clone());
                    current.insert(name, kept);
                }
            }
        }

        current
    }

    /// Drop the cached entry so the next refresh refetches.
    pub fn invalidate(&mut self, backend: &str) {
        self.slots.remove(backend);
    }

    /// Drop entries for backends no longer in the registry.
    pub fn retain(&mut self, names: &[String]) {
        self.slots.retain(|name, _| names.contains(name));
    }
}
