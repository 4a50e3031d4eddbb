//! Counters for the HITL service.
//!
//! Counters are cumulative until [`MetricsRecorder::reset`]. The pending
//! gauge is never stored here: the service passes in its table size when
//! taking a snapshot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use prometheus::{Encoder, Gauge, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Only the most recent latencies feed the running average.
pub const LATENCY_SAMPLE_CAP: usize = 1_000;

/// Point-in-time metrics, returned by value.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HitlMetrics {
    pub total_requests: u64,
    pub total_responses: u64,
    pub total_timeouts: u64,
    pub total_errors: u64,
    pub ws_delivery_success: u64,
    pub ws_delivery_failed: u64,
    pub pending_poll_deliveries: u64,
    pub average_response_time_ms: f64,
    pub pending_requests: usize,
}

#[derive(Default)]
pub struct MetricsRecorder {
    requests: AtomicU64,
    responses: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
    delivered: AtomicU64,
    delivery_failed: AtomicU64,
    pending_poll: AtomicU64,
    latencies_ms: Mutex<VecDeque<u64>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, latency_ms: u64) {
        self.responses.fetch_add(1, Ordering::Relaxed);
        let mut samples = self.latencies_ms.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() == LATENCY_SAMPLE_CAP {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failed(&self) {
        self.delivery_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pending_poll(&self) {
        self.pending_poll.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, pending_requests: usize) -> HitlMetrics {
        let samples = self.latencies_ms.lock().unwrap_or_else(|e| e.into_inner());
        let average_response_time_ms = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<u64>() as f64 / samples.len() as f64
        };

        HitlMetrics {
            total_requests: self.requests.load(Ordering::Relaxed),
            total_responses: self.responses.load(Ordering::Relaxed),
            total_timeouts: self.timeouts.load(Ordering::Relaxed),
            total_errors: self.errors.load(Ordering::Relaxed),
            ws_delivery_success: self.delivered.load(Ordering::Relaxed),
            ws_delivery_failed: self.delivery_failed.load(Ordering::Relaxed),
            pending_poll_deliveries: self.pending_poll.load(Ordering::Relaxed),
            average_response_time_ms,
            pending_requests,
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.requests,
            &self.responses,
            &self.timeouts,
            &self.errors,
            &self.delivered,
            &self.delivery_failed,
            &self.pending_poll,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.latencies_ms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Render a snapshot in Prometheus text format. Uses a private registry so
/// repeated calls never collide on metric names.
pub fn encode_metrics(metrics: &HitlMetrics) -> anyhow::Result<String> {
    let registry = Registry::new();

    let counts = [
        ("hitl_requests_total", "HITL requests accepted", metrics.total_requests),
        ("hitl_responses_total", "HITL requests answered", metrics.total_responses),
        ("hitl_timeouts_total", "HITL requests that timed out", metrics.total_timeouts),
        ("hitl_errors_total", "HITL errors of any kind", metrics.total_errors),
        ("hitl_ws_delivery_success_total", "Responses delivered to agents", metrics.ws_delivery_success),
        ("hitl_ws_delivery_failed_total", "Responses that exhausted delivery retries", metrics.ws_delivery_failed),
        ("hitl_pending_poll_total", "Responses parked for polling", metrics.pending_poll_deliveries),
    ];
    for (name, help, value) in counts {
        let gauge = IntGauge::with_opts(Opts::new(name, help))?;
        gauge.set(value as i64);
        registry.register(Box::new(gauge))?;
    }

    let pending = IntGauge::with_opts(Opts::new("hitl_pending_requests", "Requests awaiting a human"))?;
    pending.set(metrics.pending_requests as i64);
    registry.register(Box::new(pending))?;

    let latency = Gauge::with_opts(Opts::new(
        "hitl_average_response_time_ms",
        "Rolling average response latency in milliseconds",
    ))?;
    latency.set(metrics.average_response_time_ms);
    registry.register(Box::new(latency))?;

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_of_samples() {
        let m = MetricsRecorder::new();
        m.record_response(100);
        m.record_response(200);
        m.record_response(600);
        let snap = m.snapshot(0);
        assert_eq!(snap.total_responses, 3);
        assert_eq!(snap.average_response_time_ms, 300.0);
    }

    #[test]
    fn test_sample_window_is_bounded() {
        let m = MetricsRecorder::new();
        for _ in 0..LATENCY_SAMPLE_CAP {
            m.record_response(1_000);
        }
        for _ in 0..LATENCY_SAMPLE_CAP {
            m.record_response(10);
        }
        let snap = m.snapshot(0);
        assert_eq!(snap.total_responses, 2 * LATENCY_SAMPLE_CAP as u64);
        assert_eq!(snap.average_response_time_ms, 10.0);
    }

    #[test]
    fn test_reset_zeroes_counters_and_samples() {
        let m = MetricsRecorder::new();
        m.record_request();
        m.record_error();
        m.record_timeout();
        m.record_delivered();
        m.record_response(50);
        m.reset();

        let snap = m.snapshot(4);
        assert_eq!(snap, HitlMetrics { pending_requests: 4, ..Default::default() });
    }

    #[test]
    fn test_encode_metrics_text() {
        let snap = HitlMetrics {
            total_requests: 3,
            pending_requests: 1,
            average_response_time_ms: 12.5,
            ..Default::default()
        };
        let text = encode_metrics(&snap).unwrap();
        assert!(text.contains("hitl_requests_total 3"));
        assert!(text.contains("hitl_pending_requests 1"));
        assert!(text.contains("hitl_average_response_time_ms 12.5"));
    }
}
