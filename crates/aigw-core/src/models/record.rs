//! Backend registry records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a backend record was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Declared in the gateway's static configuration; always present
    Static,
    /// Registered in the dynamic registry under the key prefix
    Dynamic,
}

/// A backend known to the registry.
///
/// Created on first observation; `last_seen` is refreshed on every poll
/// that still reports the backend. Records absent for more than the
/// configured number of consecutive polls are pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRecord {
    /// Unique backend name (registry key)
    pub name: String,
    /// Base URL for relay requests
    pub base_url: String,
    /// URL of the backend's metadata document
    pub metadata_url: String,
    /// Discovery source
    pub source: RecordSource,
    /// First time the registry reported this backend
    pub first_seen: DateTime<Utc>,
    /// Most recent poll that reported this backend
    pub last_seen: DateTime<Utc>,
}

impl BackendRecord {
    /// Create a record first observed now.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        metadata_url: impl Into<String>,
        source: RecordSource,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            base_url: base_url.into(),
            metadata_url: metadata_url.into(),
            source,
            first_seen: now,
            last_seen: now,
        }
    }
}
