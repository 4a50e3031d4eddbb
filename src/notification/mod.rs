pub mod webhook;

use async_trait::async_trait;

use crate::models::HitlStatus;

pub use webhook::WebhookStatusSink;

/// Receiver of terminal status transitions (the persistence layer).
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn update_status(&self, id: &str, status: &HitlStatus) -> anyhow::Result<()>;
}

/// Sink that only records statuses in the log.
#[derive(Debug, Default, Clone)]
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn update_status(&self, id: &str, status: &HitlStatus) -> anyhow::Result<()> {
        tracing::info!(request_id = id, status = status.label(), "HITL status updated");
        Ok(())
    }
}
