//! Control plane errors

use thiserror::Error;

/// Result type for control plane operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors raised by configuration loading and registry discovery.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config parsed but failed validation
    #[error("invalid config: {0}")]
    Validation(String),

    /// Registry store unavailable or returned an error
    #[error("registry error: {0}")]
    Registry(String),
}

impl From<etcd_client::Error> for ControlError {
    fn from(e: etcd_client::Error) -> Self {
        ControlError::Registry(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ControlError {
    fn from(e: validator::ValidationErrors) -> Self {
        ControlError::Validation(e.to_string())
    }
}
