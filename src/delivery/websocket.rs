//! Transient WebSocket connections back to the originating agent.
//!
//! Each delivery opens a fresh connection, sends one text frame, waits a
//! short grace period so the frame is flushed, then closes.

use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::validator::WsValidator;
use crate::errors::DeliveryError;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const FLUSH_GRACE: Duration = Duration::from_millis(100);

/// Pushes a serialized response to an agent endpoint.
#[async_trait]
pub trait ResponseTransport: Send + Sync {
    async fn send(&self, url: &str, message: &Value) -> Result<(), DeliveryError>;
}

/// Production transport over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    validator: WsValidator,
}

impl WebSocketTransport {
    pub fn new(validator: WsValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl ResponseTransport for WebSocketTransport {
    async fn send(&self, url: &str, message: &Value) -> Result<(), DeliveryError> {
        send_websocket_message(&self.validator, url, message).await
    }
}

/// Open, send one message, close.
pub async fn send_websocket_message(
    validator: &WsValidator,
    url: &str,
    message: &Value,
) -> Result<(), DeliveryError> {
    if !validator.validate(url) {
        return Err(DeliveryError::InvalidUrl(url.to_string()));
    }
    let payload = serde_json::to_string(message)?;

    let (mut ws, _resp) = timeout(CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| DeliveryError::ConnectTimeout(CONNECT_TIMEOUT.as_millis() as u64))??;

    ws.send(Message::Text(payload)).await.map_err(|e| match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => DeliveryError::ClosedBeforeSend,
        other => DeliveryError::Connection(other),
    })?;

    sleep(FLUSH_GRACE).await;

    // The frame is already out; a failed close handshake is not a delivery failure.
    if let Err(e) = ws.close(None).await {
        tracing::debug!(url, error = %e, "websocket close after send failed");
    }

    tracing::debug!(url, "websocket message delivered");
    Ok(())
}

/// Reachability probe: connect then close, no payload.
pub async fn check_websocket_endpoint(
    validator: &WsValidator,
    url: &str,
) -> Result<(), DeliveryError> {
    if !validator.validate(url) {
        return Err(DeliveryError::InvalidUrl(url.to_string()));
    }

    let (mut ws, _resp) = timeout(PROBE_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| DeliveryError::ConnectTimeout(PROBE_TIMEOUT.as_millis() as u64))??;

    let _ = ws.close(None).await;
    Ok(())
}
