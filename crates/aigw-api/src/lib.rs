//! aigw-api - the gateway's HTTP surface
//!
//! Catalog and UI projections, gateway self health/readiness, and the
//! streaming relay endpoint. Handlers only read published routing
//! table snapshots; all mutation happens in the control plane.

pub mod error;
pub mod handlers;
pub mod relay;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the gateway router with the given application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/readyz", get(handlers::meta::readyz))
        .route("/v1/backends", get(handlers::catalog::list_backends))
        .route("/v1/ui/layout", get(handlers::catalog::ui_layout))
        .route("/v1/relay", post(handlers::relay::relay))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
