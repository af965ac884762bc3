//! aigw-client - HTTP client for the backend contract
//!
//! Implements the consumed side of the gateway's external interfaces:
//! `GET /health`, `GET /readyz`, `GET /v1/metadata`, the optional
//! `GET /v1/descriptor`, and opening relay requests (streamed or
//! batch). Wire types live in [`types`] and are converted into
//! `aigw-core` models at the edge.

pub mod client;
pub mod error;
pub mod sse;
pub mod types;

pub use client::{BackendClient, RelayResponse};
pub use error::{ClientError, ClientResult};
pub use sse::SseParser;
