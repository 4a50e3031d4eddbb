//! Request lifecycle orchestration.
//!
//! ```text
//!   process_event ──► PENDING ──┬─► RESPONDED  (handle_response)
//!                               ├─► TIMEOUT    (timer → handle_timeout)
//!                               └─► ERROR      (mark_as_error)
//! ```
//!
//! Every terminal transition goes through [`HitlService::take_pending`], an
//! atomic remove-and-tombstone on the pending table, so exactly one of the
//! three paths wins for a given id. `handle_response` cancels the timer
//! before touching the table.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio::time::Instant;

use super::metrics::{HitlMetrics, MetricsRecorder};
use super::timeout::TimeoutManager;
use crate::adapters::AdapterChain;
use crate::config::HitlConfig;
use crate::delivery::{ResponseTransport, WebSocketTransport, WsValidator};
use crate::errors::{DeliveryError, HitlError};
use crate::models::{HitlRequest, HitlResponse, HitlStatus, HookEvent};
use crate::notification::StatusSink;

/// Terminal ids remembered for re-entry rejection. Older ids are forgotten
/// first once the ledger is full.
pub const RESOLVED_ID_CAP: usize = 10_000;

/// A live request awaiting its outcome.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub request: HitlRequest,
    pub created_at: Instant,
    pub created_wall: DateTime<Utc>,
}

pub struct HitlService {
    config: HitlConfig,
    chain: AdapterChain,
    validator: WsValidator,
    timers: TimeoutManager,
    pending: DashMap<String, PendingEntry>,
    /// Ids that reached a terminal state; they can never be pending again
    /// while they are remembered here.
    resolved: DashSet<String>,
    resolved_order: Mutex<VecDeque<String>>,
    resolved_cap: usize,
    /// Responses whose delivery failed, kept for the agent to poll.
    parked: DashMap<String, HitlResponse>,
    metrics: MetricsRecorder,
    sink: Arc<dyn StatusSink>,
    transport: Arc<dyn ResponseTransport>,
    shut_down: AtomicBool,
}

impl HitlService {
    pub fn new(config: HitlConfig, sink: Arc<dyn StatusSink>) -> Self {
        let validator = WsValidator::from_config(&config);
        Self {
            transport: Arc::new(WebSocketTransport::new(validator.clone())),
            validator,
            chain: AdapterChain::new(),
            timers: TimeoutManager::new(),
            pending: DashMap::new(),
            resolved: DashSet::new(),
            resolved_order: Mutex::new(VecDeque::new()),
            resolved_cap: RESOLVED_ID_CAP,
            parked: DashMap::new(),
            metrics: MetricsRecorder::new(),
            sink,
            config,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn with_chain(mut self, chain: AdapterChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn ResponseTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Override how many terminal ids are remembered. A capacity of zero is
    /// treated as one.
    pub fn with_resolved_capacity(mut self, cap: usize) -> Self {
        self.resolved_cap = cap.max(1);
        self
    }

    pub fn config(&self) -> &HitlConfig {
        &self.config
    }

    pub fn validator(&self) -> &WsValidator {
        &self.validator
    }

    pub fn is_hitl_event(&self, event: &HookEvent) -> bool {
        self.chain.is_hitl_event(event)
    }

    /// Adapt, validate and register an event. Returns `None` without side
    /// effects unless the destination fails validation, which counts as an
    /// error.
    pub fn process_event(self: &Arc<Self>, event: &HookEvent) -> Option<HitlRequest> {
        if self.shut_down.load(Ordering::Acquire) {
            tracing::warn!("HITL service is shut down, ignoring event");
            return None;
        }

        let request = self.chain.adapt(event, &self.config)?;

        let Some(id) = event.stable_id() else {
            tracing::warn!(
                hook_event_type = %event.hook_event_type,
                "HITL event has no usable id"
            );
            return None;
        };

        if !self.validator.validate(&request.response_web_socket_url) {
            self.metrics.record_error();
            tracing::warn!(
                request_id = %id,
                url = %request.response_web_socket_url,
                "HITL destination failed validation"
            );
            return None;
        }

        match self.pending.entry(id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(request_id = %id, "HITL request already pending");
                return None;
            }
            Entry::Vacant(slot) => {
                if self.resolved.contains(&id) {
                    tracing::warn!(request_id = %id, "HITL request already resolved");
                    return None;
                }
                slot.insert(PendingEntry {
                    request: request.clone(),
                    created_at: Instant::now(),
                    created_wall: Utc::now(),
                });
            }
        }
        self.metrics.record_request();

        let seconds = request.timeout.unwrap_or(self.config.default_timeout);
        let service = Arc::downgrade(self);
        let timer_id = id.clone();
        self.timers.set(&id, seconds, move || async move {
            if let Some(service) = service.upgrade() {
                service.handle_timeout(&timer_id).await;
            }
            Ok(())
        });

        if self.config.debug {
            tracing::info!(request_id = %id, request = ?request, "HITL request registered");
        } else {
            tracing::info!(request_id = %id, kind = %request.kind, timeout_secs = seconds, "HITL request registered");
        }
        Some(request)
    }

    /// Resolve a pending request with a human answer. Returns the request
    /// that was answered.
    ///
    /// If the status sink fails the call reports an error, but the request
    /// stays resolved.
    pub async fn handle_response(
        &self,
        id: &str,
        response: HitlResponse,
    ) -> Result<HitlRequest, HitlError> {
        let (request, recorded) = self.resolve(id, response).await?;
        recorded.map_err(HitlError::StatusCallback)?;
        Ok(request)
    }

    /// Resolve a pending request and report the status. The outer error is
    /// `NotPending`; the inner result is the status sink's outcome, which
    /// does not undo the resolution.
    async fn resolve(
        &self,
        id: &str,
        response: HitlResponse,
    ) -> Result<(HitlRequest, anyhow::Result<()>), HitlError> {
        self.timers.clear(id);

        let Some(entry) = self.take_pending(id) else {
            tracing::debug!(request_id = id, "response for request that is not pending");
            return Err(HitlError::NotPending(id.to_string()));
        };

        let elapsed_ms = entry.created_at.elapsed().as_millis() as u64;
        self.metrics.record_response(elapsed_ms);
        tracing::info!(request_id = id, elapsed_ms, "HITL request answered");

        let status = HitlStatus::Responded { response };
        let recorded = self.sink.update_status(id, &status).await;
        if let Err(e) = &recorded {
            self.metrics.record_error();
            tracing::error!(request_id = id, error = %e, "status update failed after response");
        }

        Ok((entry.request, recorded))
    }

    async fn handle_timeout(&self, id: &str) {
        let Some(entry) = self.take_pending(id) else {
            tracing::debug!(request_id = id, "timer fired for request that is no longer pending");
            return;
        };

        self.metrics.record_timeout();
        tracing::info!(
            request_id = id,
            created_at = %entry.created_wall,
            "HITL request timed out"
        );

        let status = HitlStatus::Timeout {
            timed_out_at: Utc::now(),
        };
        if let Err(e) = self.sink.update_status(id, &status).await {
            tracing::error!(request_id = id, error = %e, "status update failed after timeout");
        }
    }

    /// Move a pending request to the error state.
    ///
    /// An id that is not pending is left alone: no counter, no status, and
    /// `NotPending` is returned. A request that already responded or timed
    /// out therefore never gets a second terminal status.
    pub async fn mark_as_error(&self, id: &str, message: &str) -> Result<(), HitlError> {
        self.timers.clear(id);

        if self.take_pending(id).is_none() {
            tracing::debug!(request_id = id, "cannot mark non-pending request as error");
            return Err(HitlError::NotPending(id.to_string()));
        }

        self.metrics.record_error();
        tracing::warn!(request_id = id, message, "HITL request marked as error");

        let status = HitlStatus::Error {
            message: message.to_string(),
        };
        self.sink.update_status(id, &status).await.map_err(|e| {
            self.metrics.record_error();
            tracing::error!(request_id = id, error = %e, "status update failed after error");
            HitlError::StatusCallback(e)
        })
    }

    /// Push a response to the agent with linear backoff (`delay * attempt`).
    pub async fn send_response_to_agent(
        &self,
        url: &str,
        response: &HitlResponse,
    ) -> Result<(), HitlError> {
        let message = serde_json::to_value(response).map_err(DeliveryError::from)?;
        let attempts = self.config.ws_retry_attempts;
        let base_delay_ms = self.config.ws_retry_delay_ms.max(0) as u64;
        let mut last_error = String::from("no delivery attempts configured");

        for attempt in 1..=attempts {
            match self.transport.send(url, &message).await {
                Ok(()) => {
                    self.metrics.record_delivered();
                    tracing::info!(url, attempt, "response delivered to agent");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(url, attempt, error = %e, "response delivery attempt failed");
                    let fatal = matches!(e, DeliveryError::InvalidUrl(_));
                    last_error = e.to_string();
                    if fatal {
                        break;
                    }
                    if attempt < attempts {
                        tokio::time::sleep(backoff_delay(base_delay_ms, attempt)).await;
                    }
                }
            }
        }

        self.metrics.record_delivery_failed();
        self.metrics.record_error();
        tracing::error!(url, attempts, "response delivery failed after all retries");
        Err(DeliveryError::RetriesExhausted {
            attempts: attempts.max(0),
            last: last_error,
        }
        .into())
    }

    /// Resolve and deliver. A response that cannot be delivered is parked
    /// for [`HitlService::take_polled_response`].
    ///
    /// Delivery runs even when the status sink failed; the sink error is
    /// reported after the answer has reached the agent or been parked.
    pub async fn respond(&self, id: &str, response: HitlResponse) -> Result<(), HitlError> {
        let (request, recorded) = self.resolve(id, response.clone()).await?;

        let delivered = self
            .send_response_to_agent(&request.response_web_socket_url, &response)
            .await;
        if delivered.is_err() {
            self.parked.insert(id.to_string(), response);
            self.metrics.record_pending_poll();
            tracing::warn!(request_id = id, "response parked for polling");
        }

        recorded.map_err(HitlError::StatusCallback)?;
        delivered
    }

    /// Collect a parked response. Each response can be taken once.
    pub fn take_polled_response(&self, id: &str) -> Option<HitlResponse> {
        self.parked.remove(id).map(|(_, response)| response)
    }

    pub fn get_metrics(&self) -> HitlMetrics {
        self.metrics.snapshot(self.pending.len())
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_request(&self, id: &str) -> Option<HitlRequest> {
        self.pending.get(id).map(|e| e.request.clone())
    }

    pub fn has_timer(&self, id: &str) -> bool {
        self.timers.has(id)
    }

    /// Whether `id` reached a terminal state and is still remembered.
    pub fn is_resolved(&self, id: &str) -> bool {
        self.resolved.contains(id)
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    /// Drop every timer and pending entry without emitting statuses.
    pub fn shutdown(&self) {
        let was_running = !self.shut_down.swap(true, Ordering::AcqRel);
        self.timers.clear_all();
        let dropped = self.pending.len();
        self.pending.clear();
        self.parked.clear();
        self.resolved.clear();
        self.resolved_order
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        if was_running {
            tracing::info!(dropped, "HITL service shut down");
        }
    }

    /// Record a terminal id, forgetting the oldest ones past the cap. Called
    /// with the id's pending shard locked; only touches `resolved`, so the
    /// pending-then-resolved lock order holds.
    fn remember_resolved(&self, id: &str) {
        let mut order = self
            .resolved_order
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if self.resolved.insert(id.to_string()) {
            order.push_back(id.to_string());
        }
        while order.len() > self.resolved_cap {
            if let Some(oldest) = order.pop_front() {
                self.resolved.remove(&oldest);
            }
        }
    }

    /// Atomic read-and-delete. The tombstone is written while the entry's
    /// shard is still locked, so a concurrent `process_event` for the same
    /// id cannot slip in between.
    fn take_pending(&self, id: &str) -> Option<PendingEntry> {
        match self.pending.entry(id.to_string()) {
            Entry::Occupied(slot) => {
                self.remember_resolved(id);
                Some(slot.remove())
            }
            Entry::Vacant(_) => None,
        }
    }
}

/// Linear backoff: attempt `n` waits `n * base`, saturating instead of
/// overflowing on huge configured delays.
fn backoff_delay(base_delay_ms: u64, attempt: i64) -> Duration {
    Duration::from_millis(base_delay_ms.saturating_mul(attempt.max(0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_linearly() {
        assert_eq!(backoff_delay(1000, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1000, 3), Duration::from_millis(3000));
        assert_eq!(backoff_delay(0, 5), Duration::ZERO);
    }

    #[test]
    fn test_backoff_saturates_on_huge_delay() {
        let base = i64::MAX as u64;
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(u64::MAX));
    }
}
