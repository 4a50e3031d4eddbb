use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::hitl::HitlService;

pub mod handlers;

/// Shared application state passed to handlers.
pub struct AppState {
    pub service: Arc<HitlService>,
}

/// Build the HITL HTTP router.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/events", post(handlers::ingest_event))
        .route("/events/:id/respond", post(handlers::respond))
        .route("/events/:id/error", post(handlers::mark_error))
        .route("/hitl/metrics", get(handlers::get_metrics))
        .route("/hitl/metrics/reset", post(handlers::reset_metrics))
        .route("/hitl/validate", get(handlers::validate_url))
        .route("/hitl/responses/:id", get(handlers::take_polled_response))
        .route("/metrics", get(handlers::prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
        .with_state(state)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
