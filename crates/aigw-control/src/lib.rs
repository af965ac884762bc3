//! aigw-control - the gateway's control plane
//!
//! Discovers backends (etcd registry plus static config), probes their
//! health with hysteresis, caches capability descriptors, and publishes
//! immutable routing table snapshots for the request path to read
//! lock-free.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod health;
pub mod plane;
pub mod source;

pub use config::{GatewayConfig, RelayConfig};
pub use error::{ControlError, ControlResult};
pub use health::HealthMonitor;
pub use plane::{ControlPlane, SnapshotHandle};
pub use source::{RegistryAdapter, RegistrySource};
