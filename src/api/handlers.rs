use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::delivery::WsUrlInfo;
use crate::errors::AppError;
use crate::hitl::{encode_metrics, HitlMetrics};
use crate::models::{HitlRequest, HitlResponse, HookEvent};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: Option<String>,
    pub is_hitl: bool,
    pub hitl: Option<HitlRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateParams {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub id: String,
    pub status: &'static str,
}

/// POST /events — hand an event to the HITL core.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<HookEvent>,
) -> (StatusCode, Json<IngestResponse>) {
    let is_hitl = state.service.is_hitl_event(&event);
    let hitl = if is_hitl {
        state.service.process_event(&event)
    } else {
        None
    };

    (
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            id: event.stable_id(),
            is_hitl,
            hitl,
        }),
    )
}

/// POST /events/:id/respond — resolve and deliver a human answer.
pub async fn respond(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut response): Json<HitlResponse>,
) -> Result<Json<Ack>, AppError> {
    if response.request_id.is_empty() {
        response.request_id = id.clone();
    }
    if response.responded_at == 0 {
        response.responded_at = chrono::Utc::now().timestamp_millis();
    }

    state.service.respond(&id, response).await?;
    Ok(Json(Ack { id, status: "responded" }))
}

/// POST /events/:id/error — fail a pending request explicitly.
pub async fn mark_error(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ErrorRequest>,
) -> Result<Json<Ack>, AppError> {
    if body.message.trim().is_empty() {
        return Err(AppError::BadRequest("message must not be empty".into()));
    }
    state.service.mark_as_error(&id, &body.message).await?;
    Ok(Json(Ack { id, status: "error" }))
}

/// GET /hitl/metrics
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<HitlMetrics> {
    Json(state.service.get_metrics())
}

/// POST /hitl/metrics/reset
pub async fn reset_metrics(State(state): State<Arc<AppState>>) -> StatusCode {
    state.service.reset_metrics();
    StatusCode::NO_CONTENT
}

/// GET /metrics — Prometheus text format.
pub async fn prometheus_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let body = encode_metrics(&state.service.get_metrics())?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// GET /hitl/validate?url=
pub async fn validate_url(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateParams>,
) -> Json<WsUrlInfo> {
    Json(state.service.validator().info(&params.url))
}

/// GET /hitl/responses/:id — collect a response that could not be pushed.
pub async fn take_polled_response(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HitlResponse>, AppError> {
    state
        .service
        .take_polled_response(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no parked response for {}", id)))
}
