//! Client error types

use thiserror::Error;

/// Result type for backend client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors talking to a backend.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A backend record carried an unparseable URL
    #[error("invalid URL: {0}")]
    Url(String),

    /// Transport-level failure (connect, TLS, reset)
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),

    /// The bounded per-call timeout elapsed
    #[error("request timed out")]
    Timeout,

    /// The backend does not serve this endpoint (404/405/501)
    #[error("endpoint not supported by backend")]
    Unsupported,

    /// Non-success status from the backend
    #[error("backend returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response body failed to decode
    #[error("decode error: {0}")]
    Decode(String),
}
