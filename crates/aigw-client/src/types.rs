//! Wire types for backend documents
//!
//! These mirror the JSON the backends actually serve and are kept
//! separate from the core models; conversion happens in one place so
//! missing optional fields default to empty/false instead of failing
//! the fetch.

use std::collections::BTreeSet;

use aigw_core::{
    CapabilityDescriptor, Domain, EndpointInfo, ResponseTypes, ServiceInfo, UiNavigation, UiOption,
};
use serde::Deserialize;

/// `GET /readyz` response body
#[derive(Debug, Deserialize)]
pub struct ReadinessDoc {
    /// Overall status string ("ready", "degraded", ...)
    #[serde(default)]
    pub status: String,
    /// Per-dependency check results
    #[serde(default)]
    pub checks: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ServiceDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EndpointDoc {
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub operation_id: String,
}

fn default_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CapabilitiesDoc {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub modalities: Vec<String>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub max_concurrency: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UiDoc {
    #[serde(default)]
    pub options: Vec<UiOptionDoc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UiOptionDoc {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseTypesDoc {
    #[serde(default = "default_content_type")]
    pub default: String,
    #[serde(default)]
    pub streaming: Option<String>,
}

fn default_content_type() -> String {
    "application/json".to_string()
}

#[derive(Debug, Deserialize)]
pub(crate) struct UiNavigationDoc {
    #[serde(default = "default_placement")]
    pub placement: String,
    #[serde(default = "default_group")]
    pub group: String,
}

fn default_placement() -> String {
    "main".to_string()
}

fn default_group() -> String {
    "other".to_string()
}

/// `GET /v1/metadata` (baseline) and `GET /v1/descriptor` (enhanced)
/// share this shape; the descriptor adds `response_types` and
/// `ui_navigation`.
#[derive(Debug, Deserialize)]
pub struct DescriptorDoc {
    #[serde(default)]
    pub(crate) schema_version: Option<String>,
    #[serde(default)]
    pub(crate) service: ServiceDoc,
    #[serde(default)]
    pub(crate) endpoints: Vec<EndpointDoc>,
    #[serde(default)]
    pub(crate) capabilities: CapabilitiesDoc,
    #[serde(default)]
    pub(crate) ui: UiDoc,
    #[serde(default)]
    pub(crate) response_types: Option<ResponseTypesDoc>,
    #[serde(default)]
    pub(crate) ui_navigation: Option<UiNavigationDoc>,
}

impl DescriptorDoc {
    /// Convert into the core model, defaulting everything optional.
    pub fn into_descriptor(self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            service: ServiceInfo {
                name: self.service.name,
                version: self.service.version,
            },
            domains: self
                .capabilities
                .domains
                .into_iter()
                .map(Domain::from)
                .collect::<BTreeSet<_>>(),
            modalities: self.capabilities.modalities.into_iter().collect(),
            streaming: self.capabilities.streaming,
            max_concurrency: self.capabilities.max_concurrency,
            endpoints: self
                .endpoints
                .into_iter()
                .map(|e| EndpointInfo {
                    path: e.path,
                    method: e.method,
                    operation_id: e.operation_id,
                })
                .collect(),
            response_types: self
                .response_types
                .map(|r| ResponseTypes {
                    default: r.default,
                    streaming: r.streaming,
                })
                .unwrap_or_default(),
            ui_navigation: self
                .ui_navigation
                .map(|n| UiNavigation {
                    placement: n.placement,
                    group: n.group,
                })
                .unwrap_or_default(),
            ui_options: self
                .ui
                .options
                .into_iter()
                .map(|o| UiOption {
                    id: o.id,
                    label: o.label,
                    value: o.value,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_metadata_parses_with_defaults() {
        let json = r#"{
            "schema_version": "1.0",
            "service": {"name": "ollama", "version": "0.5.1"},
            "endpoints": [{"path": "/v1/chat", "operation_id": "chat"}],
            "capabilities": {"domains": ["chat"], "streaming": true}
        }"#;
        let doc: DescriptorDoc = serde_json::from_str(json).unwrap();
        let d = doc.into_descriptor();

        assert!(d.streaming);
        assert!(d.supports(&Domain::Chat));
        assert_eq!(d.endpoints[0].method, "POST");
        assert_eq!(d.response_types.default, "application/json");
        assert_eq!(d.ui_navigation.group, "other");
    }

    #[test]
    fn test_enhanced_descriptor_carries_navigation() {
        let json = r#"{
            "service": {"name": "tts"},
            "capabilities": {"domains": ["audio"], "modalities": ["audio"]},
            "response_types": {"default": "application/json", "streaming": "text/event-stream"},
            "ui_navigation": {"placement": "sidebar", "group": "voice"}
        }"#;
        let d: DescriptorDoc = serde_json::from_str(json).unwrap();
        let d = d.into_descriptor();

        assert_eq!(d.ui_navigation.placement, "sidebar");
        assert_eq!(
            d.response_types.streaming.as_deref(),
            Some("text/event-stream")
        );
    }

    #[test]
    fn test_empty_document_yields_unknown_capabilities() {
        let d: DescriptorDoc = serde_json::from_str("{}").unwrap();
        let d = d.into_descriptor();
        assert!(d.domains.is_empty());
        assert!(!d.streaming);
    }
}
