//! POST /v1/relay

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt;
use tracing::info;
use uuid::Uuid;

use aigw_core::StreamEvent;

use crate::error::ApiError;
use crate::relay::{self, InFlightGuard, RelayRequest};
use crate::state::AppState;

/// Route the request, open the upstream, and stream normalized events.
///
/// Selection and connection failures happen before any event is
/// emitted and return the JSON error envelope; failures after that
/// point become a terminal `error` event inside the stream.
pub async fn relay(
    State(state): State<AppState>,
    Json(request): Json<RelayRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = Uuid::new_v4();

    let query = request.to_query();
    if query.model.is_none() && query.domain.is_none() {
        return Err(ApiError::bad_request(
            "request names neither a model nor a recognizable domain",
        ));
    }

    let table = state.snapshot.load();
    let open = relay::connect(&table, &query, &request.payload, &state.relay)
        .await
        .map_err(ApiError::from)?;

    let backend = open.decision.entry.name().to_string();
    info!(
        request_id = %request_id,
        backend = %backend,
        model = %open.decision.model,
        reason = ?open.decision.reason,
        generation = table.generation,
        "relay routed"
    );

    let route_event = StreamEvent::Route {
        backend: backend.clone(),
        model: open.decision.model.clone(),
        reason: open.decision.reason,
    };
    let guard = InFlightGuard::register(&open.decision.entry.in_flight);

    let events = relay::event_stream(
        backend,
        route_event,
        open.response,
        state.relay.idle_timeout(),
        state.relay.hard_timeout(),
        guard,
    );
    let sse_stream = events.map(|event| {
        Ok::<_, Infallible>(
            Event::default().data(serde_json::to_string(&event).unwrap_or_default()),
        )
    });

    Ok((
        [("x-request-id", request_id.to_string())],
        Sse::new(sse_stream).keep_alive(KeepAlive::default()),
    ))
}
