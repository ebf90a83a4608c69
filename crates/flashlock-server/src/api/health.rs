use axum::extract::State;
use axum::http::StatusCode;
use std::sync::Arc;

use crate::state::AppState;

/// GET /health
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// GET /ready
///
/// Ready means the firmware storage directory is reachable; without it
/// every session create would fail.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.config.storage_dir.is_dir() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
