//! Catalog and UI-layout projections
//!
//! Pure reads over one routing-table snapshot for discovery/UI
//! consumers. Never performs I/O, and always returns a complete
//! listing; a fully-unhealthy fleet yields a degraded catalog, not an
//! error.

use serde::{Deserialize, Serialize};

use crate::models::descriptor::UiOption;
use crate::models::domain::Domain;
use crate::models::record::RecordSource;
use crate::table::RoutingTable;

/// One backend in the aggregated catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Backend name
    pub name: String,
    /// Discovery source
    pub source: RecordSource,
    /// Base URL
    pub base_url: String,
    /// Liveness (`null` if never probed)
    pub healthy: Option<bool>,
    /// Readiness (`null` if never probed)
    pub ready: Option<bool>,
    /// Advertised domains; empty while capabilities are unknown
    pub domains: Vec<Domain>,
    /// Advertised modalities
    pub modalities: Vec<String>,
    /// Whether the backend streams
    pub streaming: bool,
    /// Service name/version, when a descriptor has been fetched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Last probe error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// The aggregated backend catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Snapshot generation the catalog was projected from
    pub generation: u64,
    /// All known backends, healthy or not
    pub backends: Vec<CatalogEntry>,
}

/// A backend placed in a UI group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiBackend {
    /// Backend name
    pub name: String,
    /// Whether the backend is currently routable
    pub available: bool,
    /// Backend-provided UI options
    pub options: Vec<UiOption>,
}

/// One navigation group of the UI layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiGroup {
    /// Group label
    pub group: String,
    /// Navigation placement
    pub placement: String,
    /// Backends in this group
    pub backends: Vec<UiBackend>,
}

/// The navigation/grouping projection for UI consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiLayout {
    /// Snapshot generation the layout was projected from
    pub generation: u64,
    /// Groups in stable label order
    pub groups: Vec<UiGroup>,
}

/// Project the catalog from a snapshot.
pub fn build_catalog(table: &RoutingTable) -> Catalog {
    let backends = table
        .entries()
        .iter()
        .map(|entry| {
            let descriptor = entry.descriptor.as_ref();
            CatalogEntry {
                name: entry.record.name.clone(),
                source: entry.record.source,
                base_url: entry.record.base_url.clone(),
                healthy: entry.health.healthy,
                ready: entry.health.ready,
                domains: descriptor
                    .map(|d| d.domains.iter().cloned().collect())
                    .unwrap_or_default(),
                modalities: descriptor
                    .map(|d| d.modalities.iter().cloned().collect())
                    .unwrap_or_default(),
                streaming: descriptor.map(|d| d.streaming).unwrap_or(false),
                service: descriptor.map(|d| {
                    if d.service.version.is_empty() {
                        d.service.name.clone()
                    } else {
                        format!("{} {}", d.service.name, d.service.version)
                    }
                }),
                last_error: entry.health.last_error.clone(),
            }
        })
        .collect();

    Catalog {
        generation: table.generation,
        backends,
    }
}

/// Project the UI layout from a snapshot.
pub fn build_ui_layout(table: &RoutingTable) -> UiLayout {
    let mut groups: Vec<UiGroup> = Vec::new();

    for entry in table.entries() {
        let nav = entry
            .descriptor
            .as_ref()
            .map(|d| d.ui_navigation.clone())
            .unwrap_or_default();
        let backend = UiBackend {
            name: entry.record.name.clone(),
            available: entry.is_eligible(),
            options: entry
                .descriptor
                .as_ref()
                .map(|d| d.ui_options.clone())
                .unwrap_or_default(),
        };

        match groups
            .iter_mut()
            .find(|g| g.group == nav.group && g.placement == nav.placement)
        {
            Some(group) => group.backends.push(backend),
            None => groups.push(UiGroup {
                group: nav.group,
                placement: nav.placement,
                backends: vec![backend],
            }),
        }
    }

    groups.sort_by(|a, b| a.group.cmp(&b.group));

    UiLayout {
        generation: table.generation,
        groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_support::entry;
    use crate::table::RoutingTableBuilder;

    #[test]
    fn test_catalog_lists_unhealthy_backends() {
        let mut b = RoutingTableBuilder::new(7);
        b.push(entry("up", &[Domain::Chat], true, true, 0));
        b.push(entry("down", &[Domain::Image], false, false, 1));
        let catalog = build_catalog(&b.build());

        assert_eq!(catalog.generation, 7);
        assert_eq!(catalog.backends.len(), 2);
        let down = catalog.backends.iter().find(|e| e.name == "down").unwrap();
        assert_eq!(down.healthy, Some(false));
        assert_eq!(down.domains, vec![Domain::Image]);
    }

    #[test]
    fn test_catalog_without_descriptor_is_degraded_not_missing() {
        let mut b = RoutingTableBuilder::new(1);
        let mut e = entry("opaque", &[], true, true, 0);
        e.descriptor = None;
        b.push(e);
        let catalog = build_catalog(&b.build());

        let item = &catalog.backends[0];
        assert_eq!(item.name, "opaque");
        assert!(item.domains.is_empty());
        assert!(!item.streaming);
    }

    #[test]
    fn test_ui_layout_groups_by_navigation() {
        let mut b = RoutingTableBuilder::new(1);
        let mut chat = entry("chat1", &[Domain::Chat], true, true, 0);
        if let Some(d) = chat.descriptor.as_mut() {
            d.ui_navigation.group = "assistants".to_string();
        }
        let mut img = entry("img1", &[Domain::Image], false, false, 1);
        if let Some(d) = img.descriptor.as_mut() {
            d.ui_navigation.group = "studio".to_string();
        }
        b.push(chat);
        b.push(img);
        let layout = build_ui_layout(&b.build());

        assert_eq!(layout.groups.len(), 2);
        assert_eq!(layout.groups[0].group, "assistants");
        assert!(layout.groups[0].backends[0].available);
        assert!(!layout.groups[1].backends[0].available);
    }
}
