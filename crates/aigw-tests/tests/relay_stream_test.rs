//! Streaming relay event-sequence guarantees
//!
//! Run with: cargo test -p aigw-tests --test relay_stream_test

use std::time::Duration;

use aigw_core::StreamEvent;
use aigw_tests::{
    chat_descriptor, collect_events, test_config, Gateway, MockBackendBuilder, RelayScript,
};
use serde_json::json;
use serial_test::serial;

fn chat_request() -> serde_json::Value {
    json!({
        "stream": true,
        "payload": {"messages": [{"role": "user", "content": "hi"}]}
    })
}

#[tokio::test]
#[serial]
async fn test_event_kinds_pass_through_in_order() {
    let backend = MockBackendBuilder::new(chat_descriptor("ollama"))
        .with_relay(RelayScript::Sse {
            frames: vec![
                json!({"type": "thinking", "text": "hmm"}),
                json!({"type": "delta", "text": "The answer"}),
                json!({"type": "audio", "url": "http://ollama/tts/1.wav"}),
            ],
            send_done: true,
            trailing_stall: None,
        })
        .spawn()
        .await;
    let gateway = Gateway::spawn(test_config(&[("ollama", backend.base_url())], &[], "")).await;
    gateway.wait_until_routable(&["ollama"]).await;

    let events = gateway.relay_events(chat_request()).await;
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["route", "thinking", "delta", "audio", "done"]);
}

#[tokio::test]
#[serial]
async fn test_upstream_disconnect_yields_error_never_done() {
    // Three deltas, then the backend closes without a terminal frame.
    let backend = MockBackendBuilder::new(chat_descriptor("ollama"))
        .with_relay(RelayScript::Sse {
            frames: vec![
                json!({"type": "delta", "text": "a"}),
                json!({"type": "delta", "text": "b"}),
                json!({"type": "delta", "text": "c"}),
            ],
            send_done: false,
            trailing_stall: None,
        })
        .spawn()
        .await;
    let gateway = Gateway::spawn(test_config(&[("ollama", backend.base_url())], &[], "")).await;
    gateway.wait_until_routable(&["ollama"]).await;

    let events = gateway.relay_events(chat_request()).await;
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["route", "delta", "delta", "delta", "error"]);

    match events.last().unwrap() {
        StreamEvent::Error { backend, code, .. } => {
            assert_eq!(backend.as_deref(), Some("ollama"));
            assert_eq!(code, "backend_unavailable");
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
#[serial]
async fn test_idle_upstream_terminates_with_timeout_error() {
    // One delta, then silence far longer than the idle window.
    let backend = MockBackendBuilder::new(chat_descriptor("ollama"))
        .with_relay(RelayScript::Sse {
            frames: vec![json!({"type": "delta", "text": "partial"})],
            send_done: false,
            trailing_stall: Some(Duration::from_secs(120)),
        })
        .spawn()
        .await;
    let gateway = Gateway::spawn(test_config(&[("ollama", backend.base_url())], &[], "")).await;
    gateway.wait_until_routable(&["ollama"]).await;

    let events = gateway.relay_events(chat_request()).await;
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["route", "delta", "error"]);

    match events.last().unwrap() {
        StreamEvent::Error { code, .. } => assert_eq!(code, "upstream_timeout"),
        _ => unreachable!(),
    }
}

#[tokio::test]
#[serial]
async fn test_unresponsive_upstream_maps_to_gateway_timeout() {
    // The backend accepts the connection but never answers; the
    // connect window (2s in the test config) expires first.
    let backend = MockBackendBuilder::new(chat_descriptor("ollama"))
        .with_relay(RelayScript::Stall(Duration::from_secs(120)))
        .spawn()
        .await;
    let gateway = Gateway::spawn(test_config(&[("ollama", backend.base_url())], &[], "")).await;
    gateway.wait_until_routable(&["ollama"]).await;

    let response = gateway
        .client
        .post(gateway.url("/v1/relay"))
        .json(&chat_request())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 504);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "upstream_timeout");
}

#[tokio::test]
#[serial]
async fn test_relay_response_carries_request_id() {
    let backend = MockBackendBuilder::new(chat_descriptor("ollama")).spawn().await;
    let gateway = Gateway::spawn(test_config(&[("ollama", backend.base_url())], &[], "")).await;
    gateway.wait_until_routable(&["ollama"]).await;

    let response = gateway
        .client
        .post(gateway.url("/v1/relay"))
        .json(&chat_request())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert!(request_id.is_some_and(|id| !id.is_empty()));

    let events = collect_events(response).await;
    assert_eq!(events.first().map(|e| e.name()), Some("route"));
}

#[tokio::test]
#[serial]
async fn test_client_disconnect_releases_the_backend_slot() {
    let descriptor = json!({
        "service": {"name": "tiny", "version": "0.1.0"},
        "endpoints": [{"path": "/v1/chat", "method": "POST", "operation_id": "chat"}],
        "capabilities": {
            "domains": ["chat"],
            "streaming": true,
            "max_concurrency": 1
        }
    });
    let backend = MockBackendBuilder::new(descriptor)
        .with_relay(RelayScript::Sse {
            frames: vec![json!({"type": "delta", "text": "slow"})],
            send_done: false,
            trailing_stall: Some(Duration::from_secs(120)),
        })
        .spawn()
        .await;
    let gateway = Gateway::spawn(test_config(&[("tiny", backend.base_url())], &[], "")).await;
    gateway.wait_until_routable(&["tiny"]).await;

    // Occupy the single slot, then disconnect mid-stream.
    {
        use futures::StreamExt;
        let mut held = gateway
            .client
            .post(gateway.url("/v1/relay"))
            .json(&chat_request())
            .send()
            .await
            .unwrap()
            .bytes_stream();
        let first = held.next().await;
        assert!(first.is_some(), "first relay must start streaming");
    }

    // The slot frees once the gateway observes the disconnect.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let response = gateway
            .client
            .post(gateway.url("/v1/relay"))
            .json(&chat_request())
            .send()
            .await
            .unwrap();
        if response.status() == 200 {
            break;
        }
        assert_eq!(response.status(), 503);
        assert!(
            tokio::time::Instant::now() < deadline,
            "backend slot never released after client disconnect"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
#[serial]
async fn test_saturated_backend_is_skipped_by_headroom_filter() {
    let descriptor = json!({
        "service": {"name": "tiny", "version": "0.1.0"},
        "endpoints": [{"path": "/v1/chat", "method": "POST", "operation_id": "chat"}],
        "capabilities": {
            "domains": ["chat"],
            "streaming": true,
            "max_concurrency": 1
        }
    });
    let backend = MockBackendBuilder::new(descriptor)
        .with_relay(RelayScript::Sse {
            frames: vec![json!({"type": "delta", "text": "slow"})],
            send_done: false,
            trailing_stall: Some(Duration::from_secs(120)),
        })
        .spawn()
        .await;
    let gateway = Gateway::spawn(test_config(&[("tiny", backend.base_url())], &[], "")).await;
    gateway.wait_until_routable(&["tiny"]).await;

    // Occupy the single slot and keep the stream open.
    let mut held = gateway
        .client
        .post(gateway.url("/v1/relay"))
        .json(&chat_request())
        .send()
        .await
        .unwrap()
        .bytes_stream();
    use futures::StreamExt;
    let first = held.next().await;
    assert!(first.is_some(), "first relay must start streaming");

    // The second request finds no backend with headroom.
    let response = gateway
        .client
        .post(gateway.url("/v1/relay"))
        .json(&chat_request())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "no_capable_backend");
}
