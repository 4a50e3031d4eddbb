use anyhow::Result;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{info, warn};

use super::StatusSink;
use crate::models::HitlStatus;

// ── Payload ───────────────────────────────────────────────────

/// Body POSTed to the persistence endpoint on every terminal transition.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate<'a> {
    /// Request id the status belongs to.
    pub id: &'a str,
    /// ISO-8601 timestamp of when the update was emitted.
    pub timestamp: String,
    #[serde(flatten)]
    pub status: &'a HitlStatus,
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns lowercase hex digest (e.g. "sha256=<hex>").
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid HMAC key: {}", e))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

// ── Webhook Sink ──────────────────────────────────────────────

/// Forwards statuses to an HTTP endpoint.
///
/// One attempt per status: a failed update is reported to the service, which
/// counts it, and is not retried.
#[derive(Clone)]
pub struct WebhookStatusSink {
    client: reqwest::Client,
    url: String,
    signing_secret: Option<String>,
}

impl WebhookStatusSink {
    pub fn new(url: impl Into<String>, signing_secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("HITL-Gateway/1.0")
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            signing_secret,
        })
    }
}

#[async_trait]
impl StatusSink for WebhookStatusSink {
    async fn update_status(&self, id: &str, status: &HitlStatus) -> Result<()> {
        let update = StatusUpdate {
            id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            status,
        };
        let payload = serde_json::to_vec(&update)?;
        let delivery_id = uuid::Uuid::new_v4().to_string();

        let mut req = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header("x-hitl-delivery-id", &delivery_id)
            .header("x-hitl-timestamp", chrono::Utc::now().timestamp().to_string())
            .header("x-hitl-status", status.label());

        if let Some(secret) = &self.signing_secret {
            req = req.header("x-hitl-signature", hmac_sha256_hex(secret, &payload)?);
        }

        let resp = req.body(payload).send().await?;
        let code = resp.status();
        if !code.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                url = %self.url,
                request_id = id,
                delivery_id = %delivery_id,
                status = %code,
                body = %body,
                "status webhook rejected update"
            );
            anyhow::bail!("status webhook returned {}", code);
        }

        info!(
            url = %self.url,
            request_id = id,
            delivery_id = %delivery_id,
            status = status.label(),
            "status webhook delivered"
        );
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────
