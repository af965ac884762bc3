//! Gateway configuration
//!
//! Loaded from a TOML file, deserialized into typed sections and then
//! validated with `validator` before anything starts. Every timing knob
//! is a plain integer in the file (seconds unless the name says
//! otherwise) with a `Duration` accessor here.

use std::path::Path;
use std::time::Duration;

use aigw_core::{Alias, HealthThresholds, MismatchPolicy};
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::error::{ControlError, ControlResult};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub registry: RegistryConfig,

    /// Statically configured backends, merged with registry discovery
    #[serde(default)]
    #[validate(nested)]
    pub backends: Vec<StaticBackendConfig>,

    /// Operator-defined aliases
    #[serde(default)]
    pub aliases: Vec<AliasConfig>,

    #[serde(default)]
    #[validate(nested)]
    pub health: HealthConfig,

    #[serde(default)]
    pub descriptor: DescriptorConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}

impl GatewayConfig {
    /// Load and validate a config file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ControlResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> ControlResult<Self> {
        let config: GatewayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Alias table in core form.
    pub fn aliases(&self) -> Vec<Alias> {
        self.aliases
            .iter()
            .map(|a| Alias {
                name: a.name.clone(),
                backend: a.backend.clone(),
                model: a.model.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

/// Registry discovery settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegistryConfig {
    /// Dynamic registry; absent means static backends only
    #[validate(nested)]
    pub etcd: Option<EtcdConfig>,

    /// Seconds between registry polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Polls a dynamic backend may be absent before it is pruned
    #[serde(default = "default_grace_polls")]
    #[validate(range(min = 1))]
    pub grace_polls: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            etcd: None,
            poll_interval_secs: default_poll_interval(),
            grace_polls: default_grace_polls(),
        }
    }
}

impl RegistryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_poll_interval() -> u64 {
    5
}

fn default_grace_polls() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EtcdConfig {
    #[validate(length(min = 1))]
    pub endpoints: Vec<String>,

    /// Key prefix under which backends register themselves
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_etcd_timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_etcd_timeout")]
    pub connect_timeout_secs: u64,
}

impl EtcdConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_prefix() -> String {
    "/gateway/backends/".to_string()
}

fn default_etcd_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "StaticBackendConfig::validate_urls"))]
pub struct StaticBackendConfig {
    #[validate(length(min = 1))]
    pub name: String,
    pub base_url: String,
    /// Defaults to `{base_url}/v1/metadata`
    pub metadata_url: Option<String>,
}

impl StaticBackendConfig {
    pub fn metadata_url(&self) -> String {
        self.metadata_url.clone().unwrap_or_else(|| {
            format!("{}/v1/metadata", self.base_url.trim_end_matches('/'))
        })
    }

    fn validate_urls(&self) -> Result<(), ValidationError> {
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ValidationError::new("invalid_base_url"));
        }
        if let Some(metadata_url) = &self.metadata_url {
            if url::Url::parse(metadata_url).is_err() {
                return Err(ValidationError::new("invalid_metadata_url"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AliasConfig {
    pub name: String,
    pub backend: String,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HealthConfig {
    /// Seconds between probe cycles
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    /// Liveness probe timeout in seconds
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,

    /// Readiness probe timeout in seconds
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,

    /// Consecutive failures before a backend is marked unhealthy
    #[serde(default = "default_failure_threshold")]
    #[validate(range(min = 1))]
    pub failure_threshold: u32,

    /// Consecutive successes before an unhealthy backend recovers
    #[serde(default = "default_recovery_threshold")]
    #[validate(range(min = 1))]
    pub recovery_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            liveness_timeout_secs: default_liveness_timeout(),
            readiness_timeout_secs: default_readiness_timeout(),
            failure_threshold: default_failure_threshold(),
            recovery_threshold: default_recovery_threshold(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            failure_threshold: self.failure_threshold,
            recovery_threshold: self.recovery_threshold,
        }
    }
}

fn default_health_interval() -> u64 {
    5
}

fn default_liveness_timeout() -> u64 {
    3
}

fn default_readiness_timeout() -> u64 {
    5
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_threshold() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct DescriptorConfig {
    /// Seconds a fetched descriptor stays fresh
    #[serde(default = "default_descriptor_ttl")]
    pub ttl_secs: u64,

    /// Descriptor fetch timeout in seconds
    #[serde(default = "default_descriptor_timeout")]
    pub timeout_secs: u64,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_descriptor_ttl(),
            timeout_secs: default_descriptor_timeout(),
        }
    }
}

impl DescriptorConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_descriptor_ttl() -> u64 {
    300
}

fn default_descriptor_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Upstream connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Seconds without an upstream event before the relay gives up
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Hard cap on total relay duration in seconds
    #[serde(default = "default_hard_timeout")]
    pub hard_timeout_secs: u64,

    /// What to do when a client wants streaming but the chosen backend
    /// cannot stream
    #[serde(default)]
    pub mismatch_policy: MismatchPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            hard_timeout_secs: default_hard_timeout(),
            mismatch_policy: MismatchPolicy::default(),
        }
    }
}

impl RelayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_secs(self.hard_timeout_secs)
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    30
}

fn default_hard_timeout() -> u64 {
    300
}
