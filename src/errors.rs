use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failures pushing a message to an agent's WebSocket endpoint.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("destination rejected by validator: {0}")]
    InvalidUrl(String),

    #[error("connection timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("connection closed before the message was sent")]
    ClosedBeforeSend,

    #[error("websocket error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("delivery failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: i64, last: String },
}

/// Failures of the HITL service operations that have a caller to report to.
#[derive(Debug, Error)]
pub enum HitlError {
    /// Unknown id, or the request already reached a terminal state.
    #[error("no pending request for id {0}")]
    NotPending(String),

    #[error("status callback failed: {0}")]
    StatusCallback(#[source] anyhow::Error),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Error surface of the HTTP API.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Hitl(#[from] HitlError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::BadRequest(m) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                m.clone(),
            ),
            AppError::NotFound(m) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
                m.clone(),
            ),
            AppError::Hitl(HitlError::NotPending(id)) => (
                StatusCode::CONFLICT,
                "state_error",
                "not_pending",
                format!("request {} is not pending", id),
            ),
            AppError::Hitl(HitlError::StatusCallback(e)) => {
                tracing::error!("status callback error: {:#}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "status_callback_failed",
                    "status update could not be recorded".to_string(),
                )
            }
            AppError::Hitl(HitlError::Delivery(e)) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "delivery_failed",
                e.to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_pending_maps_to_conflict() {
        let resp = AppError::from(HitlError::NotPending("42".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_delivery_error_maps_to_bad_gateway() {
        let err = HitlError::from(DeliveryError::ClosedBeforeSend);
        let resp = AppError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_retries_exhausted_message() {
        let err = DeliveryError::RetriesExhausted { attempts: 3, last: "refused".into() };
        assert_eq!(err.to_string(), "delivery failed after 3 attempts: refused");
    }
}
