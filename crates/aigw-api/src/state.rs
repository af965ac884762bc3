//! Shared application state

use std::sync::Arc;

use aigw_control::{RelayConfig, SnapshotHandle};

/// State shared by all request handlers.
///
/// Everything here is either immutable config or a lock-free snapshot
/// handle, so cloning per request is cheap and handlers never contend
/// with the control plane.
#[derive(Clone)]
pub struct AppState {
    /// Read handle to the current routing table
    pub snapshot: SnapshotHandle,
    /// Relay timeouts and mismatch policy
    pub relay: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(snapshot: SnapshotHandle, relay: RelayConfig) -> Self {
        Self {
            snapshot,
            relay: Arc::new(relay),
        }
    }
}
