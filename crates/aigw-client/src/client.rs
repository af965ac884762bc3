//! Backend HTTP client
//!
//! One `BackendClient` per backend record. Every call takes an explicit
//! timeout so one stalled backend can never delay work scheduled for
//! another, and no caller holds a lock across any of these calls.

use std::pin::Pin;
use std::time::Duration;

use aigw_core::{BackendRecord, CapabilityDescriptor, EndpointInfo, ReadyOutcome};
use bytes::Bytes;
use futures::Stream;
use reqwest::{Client, Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::types::{DescriptorDoc, ReadinessDoc};

/// A backend's response to a relay request.
pub enum RelayResponse {
    /// Native streaming response (SSE bytes)
    Stream(Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>),
    /// Single buffered JSON payload
    Batch(serde_json::Value),
}

/// HTTP client for one backend's contract endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
    metadata_url: Url,
}

impl BackendClient {
    /// Build a client from a registry record.
    pub fn new(record: &BackendRecord) -> ClientResult<Self> {
        Self::from_urls(&record.base_url, &record.metadata_url)
    }

    /// Build a client from raw URLs.
    pub fn from_urls(base_url: &str, metadata_url: &str) -> ClientResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::Url(format!("{base_url}: {e}")))?;
        let metadata_url = Url::parse(metadata_url)
            .map_err(|e| ClientError::Url(format!("{metadata_url}: {e}")))?;

        // Connection pooling is per-client; probes and relays share it.
        let http = Client::builder()
            .build()
            .map_err(ClientError::Connection)?;

        Ok(Self {
            http,
            base_url,
            metadata_url,
        })
    }

    /// The backend's base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn join(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Url(format!("{path}: {e}")))
    }

    /// `GET /health`: 200 means the process is alive; anything else,
    /// including a timeout, means dead. The timeout bounds the whole
    /// exchange, not just the response headers.
    pub async fn probe_liveness(&self, timeout: Duration) -> ClientResult<()> {
        let url = self.join("/health")?;
        let probe = async {
            let response = self.http.get(url).send().await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(ClientError::Status {
                    status: response.status().as_u16(),
                    message: "liveness probe failed".to_string(),
                })
            }
        };

        tokio::time::timeout(timeout, probe)
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// `GET /readyz`: 200 means able to serve, 503 means alive but not
    /// ready. Any other outcome is an inconclusive probe failure.
    pub async fn probe_readiness(&self, timeout: Duration) -> ReadyOutcome {
        let url = match self.join("/readyz") {
            Ok(url) => url,
            Err(e) => return ReadyOutcome::Failed(e.to_string()),
        };

        let probe = async {
            let response = match self.http.get(url).send().await {
                Ok(response) => response,
                Err(e) => return ReadyOutcome::Failed(e.to_string()),
            };

            match response.status() {
                status if status.is_success() => ReadyOutcome::Ready,
                StatusCode::SERVICE_UNAVAILABLE => {
                    let reason = match response.json::<ReadinessDoc>().await {
                        Ok(doc) if !doc.status.is_empty() => doc.status,
                        _ => "not ready".to_string(),
                    };
                    ReadyOutcome::NotReady(reason)
                }
                status => ReadyOutcome::Failed(format!("readiness probe returned {status}")),
            }
        };

        match tokio::time::timeout(timeout, probe).await {
            Ok(outcome) => outcome,
            Err(_) => ReadyOutcome::Failed("readiness probe timed out".to_string()),
        }
    }

    /// Fetch the backend's capabilities: `/v1/descriptor` first, then
    /// the baseline metadata document on 404/unsupported/timeout.
    pub async fn fetch_capabilities(
        &self,
        timeout: Duration,
    ) -> ClientResult<CapabilityDescriptor> {
        let descriptor_url = self.join("/v1/descriptor")?;
        match self.fetch_document(descriptor_url, timeout).await {
            Ok(doc) => Ok(doc.into_descriptor()),
            Err(ClientError::Unsupported) | Err(ClientError::Timeout) => {
                debug!(
                    backend = %self.base_url,
                    "descriptor endpoint unavailable, falling back to metadata"
                );
                let doc = self
                    .fetch_document(self.metadata_url.clone(), timeout)
                    .await?;
                Ok(doc.into_descriptor())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_document(&self, url: Url, timeout: Duration) -> ClientResult<DescriptorDoc> {
        // The timeout covers the body read as well: a backend that
        // returns headers and then stalls must not hang the caller.
        let fetch = async {
            let response = self.http.get(url).send().await?;
            match response.status() {
                status if status.is_success() => {
                    let doc: DescriptorDoc = response
                        .json()
                        .await
                        .map_err(|e| ClientError::Decode(e.to_string()))?;
                    debug!(schema_version = ?doc.schema_version, "fetched capability document");
                    Ok(doc)
                }
                StatusCode::NOT_FOUND
                | StatusCode::METHOD_NOT_ALLOWED
                | StatusCode::NOT_IMPLEMENTED => Err(ClientError::Unsupported),
                status => Err(ClientError::Status {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                }),
            }
        };

        tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Open a relay request against one of the backend's advertised
    /// endpoints. `connect_timeout` bounds connection establishment,
    /// response headers, and any buffered batch body; a streamed body
    /// is handed off within the window and read by the relay under its
    /// own idle/hard timeouts.
    pub async fn open_relay(
        &self,
        endpoint: &EndpointInfo,
        body: &serde_json::Value,
        stream: bool,
        connect_timeout: Duration,
    ) -> ClientResult<RelayResponse> {
        let url = self.join(&endpoint.path)?;
        let method = Method::from_bytes(endpoint.method.as_bytes())
            .map_err(|_| ClientError::Url(format!("invalid method: {}", endpoint.method)))?;

        let mut request = self.http.request(method, url).json(body);
        if stream {
            request = request.header("Accept", "text/event-stream");
        }

        let open = async {
            let response = request.send().await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let message = response.text().await.unwrap_or_default();
                return Err(ClientError::Status { status, message });
            }

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            if content_type.starts_with("text/event-stream") {
                Ok(RelayResponse::Stream(Box::pin(response.bytes_stream())))
            } else {
                let value = response
                    .json()
                    .await
                    .map_err(|e| ClientError::Decode(e.to_string()))?;
                Ok(RelayResponse::Batch(value))
            }
        };

        tokio::time::timeout(connect_timeout, open)
            .await
            .map_err(|_| ClientError::Timeout)?
    }
}
