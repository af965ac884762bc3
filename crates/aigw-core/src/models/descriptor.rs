//! Capability descriptor models
//!
//! A descriptor is the enhanced capability document a backend may
//! expose via `/v1/descriptor`; the baseline `/v1/metadata` document
//! maps onto the same type with the optional sections defaulted.
//! Descriptors are replaced wholesale on refetch, never partially
//! mutated.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::domain::Domain;

/// Identity of the service behind a backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name (e.g., "ollama")
    pub name: String,
    /// Service version string
    #[serde(default)]
    pub version: String,
}

/// A single endpoint a backend advertises
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Path relative to the backend's base URL
    pub path: String,
    /// HTTP method
    pub method: String,
    /// Operation identifier (conventionally the domain name, e.g. "chat")
    pub operation_id: String,
}

/// Content types a backend produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTypes {
    /// Content type of a batch response
    pub default: String,
    /// Content type of a streamed response, if streaming is supported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<String>,
}

impl Default for ResponseTypes {
    fn default() -> Self {
        Self {
            default: "application/json".to_string(),
            streaming: None,
        }
    }
}

/// Where a backend wants to appear in UI navigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiNavigation {
    /// Navigation placement (e.g., "sidebar", "main")
    pub placement: String,
    /// Grouping label
    pub group: String,
}

impl Default for UiNavigation {
    fn default() -> Self {
        Self {
            placement: "main".to_string(),
            group: "other".to_string(),
        }
    }
}

/// A UI-facing option a backend exposes (model picker entries, voices, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiOption {
    /// Option identifier
    pub id: String,
    /// Display label
    #[serde(default)]
    pub label: String,
    /// Opaque option payload
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub value: serde_json::Value,
}

/// The advertised capabilities of a backend.
///
/// Owned by the descriptor fetcher; a fetch failure keeps the previous
/// value in place rather than degrading it field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Service identity
    pub service: ServiceInfo,
    /// Capability domains this backend serves
    #[serde(default)]
    pub domains: BTreeSet<Domain>,
    /// Input/output modalities (text, image, audio, ...)
    #[serde(default)]
    pub modalities: BTreeSet<String>,
    /// Whether the backend can stream responses
    #[serde(default)]
    pub streaming: bool,
    /// Declared concurrency ceiling, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    /// Endpoints the backend serves relay traffic on
    #[serde(default)]
    pub endpoints: Vec<EndpointInfo>,
    /// Response content types
    #[serde(default)]
    pub response_types: ResponseTypes,
    /// UI navigation hints
    #[serde(default)]
    pub ui_navigation: UiNavigation,
    /// UI options
    #[serde(default)]
    pub ui_options: Vec<UiOption>,
}

impl CapabilityDescriptor {
    /// Whether this backend advertises the given domain.
    pub fn supports(&self, domain: &Domain) -> bool {
        self.domains.contains(domain)
    }

    /// The endpoint to relay a request for `domain` to.
    ///
    /// Prefers an endpoint whose `operation_id` matches the domain name,
    /// falling back to the first advertised endpoint.
    pub fn relay_endpoint(&self, domain: &Domain) -> Option<&EndpointInfo> {
        self.endpoints
            .iter()
            .find(|e| e.operation_id == domain.as_str())
            .or_else(|| self.endpoints.first())
    }
}
