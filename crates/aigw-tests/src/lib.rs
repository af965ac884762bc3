//! Integration test harness for the AI gateway
//!
//! Everything runs in-process: mock backends are small axum servers on
//! ephemeral ports implementing the backend contract (`/health`,
//! `/readyz`, `/v1/metadata`, `/v1/descriptor`, a relay endpoint), and
//! the gateway under test is a real control plane plus router served
//! the same way. No external processes, no fixed ports.
//!
//! Run with: cargo test -p aigw-tests

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use aigw_api::{create_router, AppState};
use aigw_client::SseParser;
use aigw_control::{ControlPlane, GatewayConfig};
use aigw_core::StreamEvent;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::sleep;

/// How a mock backend answers its relay endpoint.
#[derive(Clone)]
pub enum RelayScript {
    /// Stream SSE frames, optionally a `done` frame, then optionally
    /// stall before closing the connection
    Sse {
        frames: Vec<Value>,
        send_done: bool,
        trailing_stall: Option<Duration>,
    },
    /// Respond with one buffered JSON payload
    Batch(Value),
    /// Respond with an HTTP error status
    Fail(u16),
    /// Sit on the request without answering (exercises the connect
    /// timeout), then return a batch payload
    Stall(Duration),
}

impl RelayScript {
    /// A well-behaved streaming script: the given deltas then `done`.
    pub fn deltas(texts: &[&str]) -> Self {
        RelayScript::Sse {
            frames: texts
                .iter()
                .map(|t| json!({"type": "delta", "text": t}))
                .collect(),
            send_done: true,
            trailing_stall: None,
        }
    }
}

#[derive(Clone)]
struct MockState {
    healthy: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
    descriptor: Arc<RwLock<Value>>,
    descriptor_endpoint: bool,
    metadata_delay: Option<Duration>,
    relay: Arc<RelayScript>,
    relay_hits: Arc<AtomicUsize>,
}

/// One in-process backend, controllable while the gateway runs.
pub struct MockBackend {
    pub addr: SocketAddr,
    /// Flip to make `/health` fail
    pub healthy: Arc<AtomicBool>,
    /// Flip to make `/readyz` return 503
    pub ready: Arc<AtomicBool>,
    /// How many relay requests this backend has served
    pub relay_hits: Arc<AtomicUsize>,
    descriptor: Arc<RwLock<Value>>,
}

impl MockBackend {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Swap the advertised capability document, as a restarted backend
    /// with a different model lineup would.
    pub fn set_descriptor(&self, descriptor: Value) {
        *self.descriptor.write().unwrap() = descriptor;
    }
}

/// Builder for a mock backend.
pub struct MockBackendBuilder {
    descriptor: Value,
    descriptor_endpoint: bool,
    metadata_delay: Option<Duration>,
    relay: RelayScript,
}

impl MockBackendBuilder {
    pub fn new(descriptor: Value) -> Self {
        Self {
            descriptor,
            descriptor_endpoint: false,
            metadata_delay: None,
            relay: RelayScript::deltas(&["hello"]),
        }
    }

    /// Also serve the enhanced `/v1/descriptor` endpoint.
    pub fn with_descriptor_endpoint(mut self) -> Self {
        self.descriptor_endpoint = true;
        self
    }

    /// Delay `/v1/metadata` responses (to exercise fetch timeouts).
    pub fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = Some(delay);
        self
    }

    pub fn with_relay(mut self, relay: RelayScript) -> Self {
        self.relay = relay;
        self
    }

    pub async fn spawn(self) -> MockBackend {
        let healthy = Arc::new(AtomicBool::new(true));
        let ready = Arc::new(AtomicBool::new(true));
        let relay_hits = Arc::new(AtomicUsize::new(0));
        let descriptor = Arc::new(RwLock::new(self.descriptor));

        let state = MockState {
            healthy: healthy.clone(),
            ready: ready.clone(),
            descriptor: descriptor.clone(),
            descriptor_endpoint: self.descriptor_endpoint,
            metadata_delay: self.metadata_delay,
            relay: Arc::new(self.relay),
            relay_hits: relay_hits.clone(),
        };

        let app = Router::new()
            .route("/health", get(mock_health))
            .route("/readyz", get(mock_readyz))
            .route("/v1/metadata", get(mock_metadata))
            .route("/v1/descriptor", get(mock_descriptor))
            .route("/v1/chat", post(mock_relay))
            .route("/v1/generate", post(mock_relay))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockBackend {
            addr,
            healthy,
            ready,
            relay_hits,
            descriptor,
        }
    }
}

async fn mock_health(State(state): State<MockState>) -> impl IntoResponse {
    if state.healthy.load(Ordering::Relaxed) {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "down")
    }
}

async fn mock_readyz(State(state): State<MockState>) -> impl IntoResponse {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, Json(json!({"status": "ready", "checks": {}})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "model loading", "checks": {}})),
        )
    }
}

async fn mock_metadata(State(state): State<MockState>) -> impl IntoResponse {
    if let Some(delay) = state.metadata_delay {
        sleep(delay).await;
    }
    Json(state.descriptor.read().unwrap().clone())
}

async fn mock_descriptor(State(state): State<MockState>) -> impl IntoResponse {
    if state.descriptor_endpoint {
        Json(state.descriptor.read().unwrap().clone()).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn mock_relay(State(state): State<MockState>) -> axum::response::Response {
    state.relay_hits.fetch_add(1, Ordering::Relaxed);

    match (*state.relay).clone() {
        RelayScript::Batch(value) => Json(value).into_response(),
        RelayScript::Fail(status) => StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        RelayScript::Stall(delay) => {
            sleep(delay).await;
            Json(json!({"text": "too late"})).into_response()
        }
        RelayScript::Sse {
            frames,
            send_done,
            trailing_stall,
        } => {
            let stream = async_stream::stream! {
                for frame in frames {
                    sleep(Duration::from_millis(10)).await;
                    yield Ok::<_, std::convert::Infallible>(
                        Event::default().data(frame.to_string()),
                    );
                }
                if send_done {
                    yield Ok(Event::default().data(json!({"type": "done"}).to_string()));
                }
                if let Some(stall) = trailing_stall {
                    sleep(stall).await;
                }
            };
            Sse::new(stream).into_response()
        }
    }
}

/// Capability document for a streaming chat backend.
pub fn chat_descriptor(name: &str) -> Value {
    json!({
        "schema_version": "1.0",
        "service": {"name": name, "version": "0.1.0"},
        "endpoints": [{"path": "/v1/chat", "method": "POST", "operation_id": "chat"}],
        "capabilities": {"domains": ["chat"], "modalities": ["text"], "streaming": true}
    })
}

/// Capability document for a batch-only image backend.
pub fn image_descriptor(name: &str) -> Value {
    json!({
        "schema_version": "1.0",
        "service": {"name": name, "version": "0.1.0"},
        "endpoints": [{"path": "/v1/generate", "method": "POST", "operation_id": "image"}],
        "capabilities": {"domains": ["image"], "modalities": ["image"], "streaming": false}
    })
}

/// The gateway under test.
pub struct Gateway {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown: watch::Sender<bool>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Spawn the control plane and HTTP surface on an ephemeral port.
    pub async fn spawn(config: GatewayConfig) -> Gateway {
        let relay_config = config.relay.clone();
        let plane = ControlPlane::new(config);
        let snapshot = plane.handle();

        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(plane.run(shutdown_rx));

        let app = create_router(AppState::new(snapshot, relay_config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Gateway {
            addr,
            client: reqwest::Client::new(),
            shutdown,
        }
    }

    /// Wait until `/readyz` returns 200 and (optionally) until every
    /// named backend shows up eligible in the catalog.
    pub async fn wait_until_routable(&self, backends: &[&str]) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
        loop {
            assert!(
                tokio::time::Instant::now() < deadline,
                "gateway did not become routable for {backends:?}"
            );

            if let Ok(response) = self.client.get(self.url("/readyz")).send().await {
                if response.status() == 200 {
                    let catalog: Value = self
                        .client
                        .get(self.url("/v1/backends"))
                        .send()
                        .await
                        .unwrap()
                        .json()
                        .await
                        .unwrap();
                    let listed = catalog["backends"].as_array().cloned().unwrap_or_default();
                    let all_eligible = backends.iter().all(|name| {
                        listed.iter().any(|b| {
                            b["name"] == *name
                                && b["healthy"] == json!(true)
                                && b["ready"] == json!(true)
                        })
                    });
                    if all_eligible {
                        return;
                    }
                }
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    /// POST a relay request and collect the full event sequence.
    pub async fn relay_events(&self, body: Value) -> Vec<StreamEvent> {
        let response = self
            .client
            .post(self.url("/v1/relay"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "relay refused: {}", response.status());
        collect_events(response).await
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Drain an SSE response into parsed events, stopping at the terminal
/// event or the end of the stream.
pub async fn collect_events(response: reqwest::Response) -> Vec<StreamEvent> {
    use futures::StreamExt;

    let mut parser = SseParser::new();
    let mut events = Vec::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(_) => break,
        };
        for parsed in parser.feed(chunk) {
            if let Ok(event) = parsed {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    return events;
                }
            }
        }
    }
    events
}

/// Build a gateway config with fast test timings.
///
/// `aliases` are `(name, backend, pinned model)`; `relay_extra` is
/// appended to the `[relay]` section (e.g. a mismatch policy line).
pub fn test_config(
    backends: &[(&str, String)],
    aliases: &[(&str, &str, Option<&str>)],
    relay_extra: &str,
) -> GatewayConfig {
    let mut toml = String::from(
        "[registry]\n\
         poll_interval_secs = 1\n\
         \n\
         [health]\n\
         interval_secs = 1\n\
         liveness_timeout_secs = 1\n\
         readiness_timeout_secs = 1\n\
         \n\
         [descriptor]\n\
         ttl_secs = 300\n\
         timeout_secs = 1\n\
         \n\
         [relay]\n\
         connect_timeout_secs = 2\n\
         idle_timeout_secs = 2\n\
         hard_timeout_secs = 30\n",
    );
    toml.push_str(relay_extra);

    for (name, base_url) in backends {
        toml.push_str(&format!(
            "\n[[backends]]\nname = \"{name}\"\nbase_url = \"{base_url}\"\n"
        ));
    }
    for (name, backend, model) in aliases {
        toml.push_str(&format!(
            "\n[[aliases]]\nname = \"{name}\"\nbackend = \"{backend}\"\n"
        ));
        if let Some(model) = model {
            toml.push_str(&format!("model = \"{model}\"\n"));
        }
    }

    GatewayConfig::from_toml(&toml).expect("test config must parse")
}
