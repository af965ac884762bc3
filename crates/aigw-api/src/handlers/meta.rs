//! Gateway self health and readiness

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// GET /readyz
///
/// 503 until the control plane has published its first routing table;
/// the same contract the gateway expects of its own backends.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let table = state.snapshot.load();
    let ready = table.generation > 0;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = Json(json!({
        "status": if ready { "ready" } else { "starting" },
        "checks": {
            "routing_table": {
                "generation": table.generation,
                "backends": table.entries().len(),
            }
        }
    }));

    (status, body)
}
