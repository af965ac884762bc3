//! Catalog and UI layout projections
//!
//! Pure reads of the current snapshot. Unhealthy backends stay listed
//! with their health flags; the catalog is degraded, never empty, as
//! long as backends are registered.

use aigw_core::{build_catalog, build_ui_layout, Catalog, UiLayout};
use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /v1/backends
pub async fn list_backends(State(state): State<AppState>) -> Json<Catalog> {
    Json(build_catalog(&state.snapshot.load()))
}

/// GET /v1/ui/layout
pub async fn ui_layout(State(state): State<AppState>) -> Json<UiLayout> {
    Json(build_ui_layout(&state.snapshot.load()))
}
