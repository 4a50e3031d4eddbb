//! Human-in-the-loop request lifecycle: timers, metrics and the service
//! that ties adapters, validation and status reporting together.

pub mod metrics;
pub mod service;
pub mod timeout;

pub use metrics::{encode_metrics, HitlMetrics};
pub use service::{HitlService, PendingEntry};
pub use timeout::TimeoutManager;
