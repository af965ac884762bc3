//! Gateway error taxonomy

use thiserror::Error;

use crate::models::domain::Domain;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced by routing and relaying.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No eligible backend serves the requested domain/alias. This is a
    /// normal outcome, not an internal failure.
    #[error("no capable backend for domain '{0}'")]
    NoCapableBackend(Domain),

    /// The selected backend does not advertise a capability the request
    /// needs (and policy is reject)
    #[error("backend '{backend}' does not support {capability}")]
    CapabilityMismatch {
        /// Selected backend
        backend: String,
        /// Missing capability
        capability: String,
    },

    /// The request named neither a resolvable alias nor a domain
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Could not establish a connection to the selected backend
    #[error("backend '{backend}' unavailable: {reason}")]
    BackendUnavailable {
        /// Selected backend
        backend: String,
        /// Connection failure cause
        reason: String,
    },

    /// The backend missed a timeout window: the connect window, the
    /// idle window, or the hard deadline
    #[error("backend '{backend}' timed out")]
    UpstreamTimeout {
        /// Backend that timed out
        backend: String,
    },
}

impl GatewayError {
    /// HTTP status code for non-streaming failure paths.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NoCapableBackend(_) => 503,
            GatewayError::CapabilityMismatch { .. } => 422,
            GatewayError::InvalidRequest(_) => 400,
            GatewayError::BackendUnavailable { .. } => 502,
            GatewayError::UpstreamTimeout { .. } => 504,
        }
    }

    /// Stable machine-readable error type for the error envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::NoCapableBackend(_) => "no_capable_backend",
            GatewayError::CapabilityMismatch { .. } => "capability_mismatch",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::BackendUnavailable { .. } => "backend_unavailable",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
        }
    }
}
