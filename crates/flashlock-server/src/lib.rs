pub mod catalog;
pub mod config;
pub mod credits;
pub mod sessions;
pub mod state;
pub mod vault;

mod api;
mod error;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health checks
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Flash session protocol
        .route("/api/flash/sessions", post(api::flash::create_session))
        .route("/api/flash/sessions/:session_id", get(api::flash::read_session))
        .route(
            "/api/flash/sessions/:session_id/firmware/:artifact",
            get(api::flash::fetch_artifact),
        )
        .route(
            "/api/flash/sessions/:session_id/complete",
            post(api::flash::complete_session),
        )
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(state)
}
