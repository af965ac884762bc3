//! Streaming relay engine
//!
//! Connects to the routed backend and translates its response, native
//! SSE or a single batch payload, into the normalized event sequence
//! `route (thinking|delta|audio)* (done|error)`. The connection is
//! established before the `route` event is emitted, so a reroute after
//! a connect failure never produces two `route` events. Events flow
//! one at a time through the generator, so a slow client suspends
//! upstream reads instead of growing a buffer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aigw_client::{BackendClient, ClientError, RelayResponse, SseParser};
use aigw_control::RelayConfig;
use aigw_core::{
    route, route_excluding, Domain, EndpointInfo, GatewayError, RouteDecision, RouteQuery,
    RoutingTable, StreamEvent,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Client request body for the relay endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RelayRequest {
    /// Explicit model or alias name
    pub model: Option<String>,
    /// Explicit capability domain; inferred from the payload if absent
    pub domain: Option<String>,
    /// Whether the client wants a streamed response
    #[serde(default)]
    pub stream: bool,
    /// Opaque request body forwarded to the backend
    #[serde(default)]
    pub payload: Value,
}

impl RelayRequest {
    /// Build the routing query, inferring the domain from the payload
    /// shape when none was named.
    pub fn to_query(&self) -> RouteQuery {
        let domain = self
            .domain
            .as_deref()
            .map(Domain::from)
            .or_else(|| infer_domain(&self.payload));
        RouteQuery {
            model: self.model.clone(),
            domain,
            want_stream: self.stream,
        }
    }
}

/// Guess the capability domain from the request body shape.
pub fn infer_domain(payload: &Value) -> Option<Domain> {
    let obj = payload.as_object()?;
    if obj.contains_key("messages") {
        return Some(Domain::Chat);
    }
    if obj.contains_key("voice") || obj.contains_key("speech") {
        return Some(Domain::Audio);
    }
    if obj.contains_key("size") || obj.contains_key("negative_prompt") {
        return Some(Domain::Image);
    }
    if obj.contains_key("tool") || obj.contains_key("arguments") {
        return Some(Domain::Tool);
    }
    if obj.contains_key("input") {
        return Some(Domain::Embedding);
    }
    // A bare prompt with no image hints reads as chat.
    if obj.contains_key("prompt") {
        return Some(Domain::Chat);
    }
    None
}

/// A routed, connected relay ready to stream.
pub struct OpenRelay {
    pub decision: RouteDecision,
    pub response: RelayResponse,
}

/// Route the query and establish the upstream connection, with at most
/// one reroute to the next-best entry after a connect failure.
pub async fn connect(
    table: &RoutingTable,
    query: &RouteQuery,
    payload: &Value,
    config: &RelayConfig,
) -> Result<OpenRelay, GatewayError> {
    let decision = route(table, query, config.mismatch_policy)?;

    let first_error = match open_upstream(&decision, query, payload, config).await {
        Ok(response) => return Ok(OpenRelay { decision, response }),
        Err(e) => e,
    };
    warn!(backend = decision.entry.name(), error = %first_error, "connect failed, attempting reroute");

    let failed = decision.entry.name().to_string();
    let retry = match route_excluding(table, query, config.mismatch_policy, &failed) {
        Ok(retry) => retry,
        // No second-best entry: surface the original connect failure.
        Err(_) => return Err(first_error),
    };

    match open_upstream(&retry, query, payload, config).await {
        Ok(response) => {
            info!(backend = retry.entry.name(), "rerouted after connect failure");
            Ok(OpenRelay {
                decision: retry,
                response,
            })
        }
        Err(e) => Err(e),
    }
}

async fn open_upstream(
    decision: &RouteDecision,
    query: &RouteQuery,
    payload: &Value,
    config: &RelayConfig,
) -> Result<RelayResponse, GatewayError> {
    let backend = decision.entry.name().to_string();
    let endpoint = relay_endpoint(decision, query).ok_or_else(|| {
        GatewayError::BackendUnavailable {
            backend: backend.clone(),
            reason: "no relay endpoint advertised".to_string(),
        }
    })?;

    let client =
        BackendClient::new(&decision.entry.record).map_err(|e| GatewayError::BackendUnavailable {
            backend: backend.clone(),
            reason: e.to_string(),
        })?;

    let upstream_stream = query.want_stream && !decision.downgrade;
    let mut body = payload.clone();
    if let Some(obj) = body.as_object_mut() {
        obj.insert("model".to_string(), json!(decision.model));
        obj.insert("stream".to_string(), json!(upstream_stream));
    }

    client
        .open_relay(&endpoint, &body, upstream_stream, config.connect_timeout())
        .await
        .map_err(|e| match e {
            ClientError::Timeout => GatewayError::UpstreamTimeout { backend },
            e => GatewayError::BackendUnavailable {
                backend,
                reason: e.to_string(),
            },
        })
}

fn relay_endpoint(decision: &RouteDecision, query: &RouteQuery) -> Option<EndpointInfo> {
    let descriptor = decision.entry.descriptor.as_ref()?;
    let domain = query
        .domain
        .clone()
        .or_else(|| descriptor.domains.iter().next().cloned())?;
    descriptor.relay_endpoint(&domain).cloned()
}

/// RAII in-flight marker backing the capacity-headroom filter. The
/// gauge outlives any single table generation.
pub struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    pub fn register(gauge: &Arc<AtomicUsize>) -> Self {
        gauge.fetch_add(1, Ordering::Relaxed);
        Self(gauge.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Translate one upstream response into the normalized event sequence.
///
/// The returned stream always starts with `route_event` and always
/// ends with exactly one terminal event. Dropping it cancels the
/// upstream request and releases the in-flight slot.
pub fn event_stream(
    backend: String,
    route_event: StreamEvent,
    response: RelayResponse,
    idle_timeout: Duration,
    hard_timeout: Duration,
    guard: InFlightGuard,
) -> impl Stream<Item = StreamEvent> {
    async_stream::stream! {
        let _guard = guard;
        yield route_event;

        match response {
            RelayResponse::Batch(value) => {
                for event in batch_events(&value) {
                    yield event;
                }
            }
            RelayResponse::Stream(mut bytes) => {
                let mut parser = SseParser::new();
                let started = Instant::now();

                'relay: loop {
                    let Some(remaining) = hard_timeout.checked_sub(started.elapsed()) else {
                        yield timeout_event(&backend, "hard timeout exceeded");
                        break;
                    };
                    let wait = idle_timeout.min(remaining);

                    match tokio::time::timeout(wait, bytes.next()).await {
                        Err(_) => {
                            let cause = if started.elapsed() >= hard_timeout {
                                "hard timeout exceeded"
                            } else {
                                "no data within idle window"
                            };
                            yield timeout_event(&backend, cause);
                            break;
                        }
                        Ok(None) => {
                            yield StreamEvent::Error {
                                backend: Some(backend.clone()),
                                code: "backend_unavailable".to_string(),
                                message: "stream closed before completion".to_string(),
                            };
                            break;
                        }
                        Ok(Some(Err(e))) => {
                            yield StreamEvent::Error {
                                backend: Some(backend.clone()),
                                code: "backend_unavailable".to_string(),
                                message: e.to_string(),
                            };
                            break;
                        }
                        Ok(Some(Ok(chunk))) => {
                            for parsed in parser.feed(chunk) {
                                match parsed {
                                    // The gateway owns routing; an upstream
                                    // route frame is never forwarded.
                                    Ok(StreamEvent::Route { .. }) => {
                                        debug!(backend = %backend, "dropping upstream route event");
                                    }
                                    Ok(event) => {
                                        let terminal = event.is_terminal();
                                        yield attribute(event, &backend);
                                        if terminal {
                                            break 'relay;
                                        }
                                    }
                                    Err(e) => {
                                        warn!(backend = %backend, error = %e, "skipping malformed upstream frame");
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Downgrade a batch payload: optional `text` and `audio_url`, then
/// `done`.
fn batch_events(value: &Value) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
        events.push(StreamEvent::Delta {
            text: text.to_string(),
        });
    }
    if let Some(url) = value.get("audio_url").and_then(|u| u.as_str()) {
        events.push(StreamEvent::Audio {
            url: url.to_string(),
        });
    }
    events.push(StreamEvent::Done);
    events
}

fn timeout_event(backend: &str, message: &str) -> StreamEvent {
    // The synthetic terminal event carries the taxonomy's code so SSE
    // and non-streaming failures stay in the same vocabulary.
    let cause = GatewayError::UpstreamTimeout {
        backend: backend.to_string(),
    };
    StreamEvent::Error {
        backend: Some(backend.to_string()),
        code: cause.error_type().to_string(),
        message: message.to_string(),
    }
}

/// Fill in the backend name on upstream error events that lack one.
fn attribute(event: StreamEvent, backend: &str) -> StreamEvent {
    match event {
        StreamEvent::Error {
            backend: None,
            code,
            message,
        } => StreamEvent::Error {
            backend: Some(backend.to_string()),
            code,
            message,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigw_core::RouteReason;
    use pretty_assertions::assert_eq;

    fn route_event() -> StreamEvent {
        StreamEvent::Route {
            backend: "b".to_string(),
            model: "m".to_string(),
            reason: RouteReason::Domain,
        }
    }

    fn gauge() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_infer_domain_from_payload_shape() {
        let cases = [
            (json!({"messages": [{"role": "user"}]}), Some(Domain::Chat)),
            (json!({"prompt": "a cat", "size": "512x512"}), Some(Domain::Image)),
            (json!({"text": "hello", "voice": "nova"}), Some(Domain::Audio)),
            (json!({"tool": "search", "arguments": {}}), Some(Domain::Tool)),
            (json!({"input": ["a", "b"]}), Some(Domain::Embedding)),
            (json!({"prompt": "hello"}), Some(Domain::Chat)),
            (json!({}), None),
            (json!("not an object"), None),
        ];
        for (payload, expected) in cases {
            assert_eq!(infer_domain(&payload), expected, "payload: {payload}");
        }
    }

    #[test]
    fn test_batch_events_order() {
        let events = batch_events(&json!({"text": "hi", "audio_url": "http://a/x.wav"}));
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta {
                    text: "hi".to_string()
                },
                StreamEvent::Audio {
                    url: "http://a/x.wav".to_string()
                },
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_batch_without_content_still_terminates() {
        assert_eq!(batch_events(&json!({})), vec![StreamEvent::Done]);
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let gauge = gauge();
        {
            let _a = InFlightGuard::register(&gauge);
            let _b = InFlightGuard::register(&gauge);
            assert_eq!(gauge.load(Ordering::Relaxed), 2);
        }
        assert_eq!(gauge.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_batch_response_downgrades_to_one_delta_then_done() {
        let gauge = gauge();
        let stream = event_stream(
            "b".to_string(),
            route_event(),
            RelayResponse::Batch(json!({"text": "full answer"})),
            Duration::from_secs(1),
            Duration::from_secs(5),
            InFlightGuard::register(&gauge),
        );
        let events: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].name(), "route");
        assert_eq!(
            events[1],
            StreamEvent::Delta {
                text: "full answer".to_string()
            }
        );
        assert_eq!(events[2], StreamEvent::Done);
        assert_eq!(gauge.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_silent_upstream_hits_idle_timeout() {
        let gauge = gauge();
        let stream = event_stream(
            "b".to_string(),
            route_event(),
            RelayResponse::Stream(Box::pin(futures::stream::pending())),
            Duration::from_millis(20),
            Duration::from_secs(5),
            InFlightGuard::register(&gauge),
        );
        let events: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            StreamEvent::Error { code, backend, .. } => {
                assert_eq!(code, "upstream_timeout");
                assert_eq!(backend.as_deref(), Some("b"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_upstream_yields_error_not_done() {
        let gauge = gauge();
        let chunks = vec![
            Ok(bytes::Bytes::from_static(
                b"data: {\"type\":\"delta\",\"text\":\"a\"}\n\n",
            )),
        ];
        let stream = event_stream(
            "b".to_string(),
            route_event(),
            RelayResponse::Stream(Box::pin(futures::stream::iter(chunks))),
            Duration::from_secs(1),
            Duration::from_secs(5),
            InFlightGuard::register(&gauge),
        );
        let events: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[1].name(), "delta");
        match &events[2] {
            StreamEvent::Error { code, .. } => assert_eq!(code, "backend_unavailable"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nothing_after_terminal_event() {
        let gauge = gauge();
        let chunks = vec![
            Ok(bytes::Bytes::from_static(b"data: {\"type\":\"done\"}\n\n")),
            Ok(bytes::Bytes::from_static(
                b"data: {\"type\":\"delta\",\"text\":\"late\"}\n\n",
            )),
        ];
        let stream = event_stream(
            "b".to_string(),
            route_event(),
            RelayResponse::Stream(Box::pin(futures::stream::iter(chunks))),
            Duration::from_secs(1),
            Duration::from_secs(5),
            InFlightGuard::register(&gauge),
        );
        let events: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StreamEvent::Done);
    }
}
