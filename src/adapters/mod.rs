//! Event → canonical request adapters.
//!
//! Adapters are consulted in priority order. The first one whose
//! [`Adapter::can_handle`] accepts the event owns it: if its `adapt` then
//! declines (e.g. no destination), the event is dropped rather than offered
//! to lower-priority adapters.

pub mod direct;
pub mod notification;
pub mod post_tool;
pub mod pre_tool;

use serde_json::{Map, Value};

use crate::config::HitlConfig;
use crate::models::{HitlRequest, HookEvent};

pub use direct::DirectAdapter;
pub use notification::NotificationAdapter;
pub use post_tool::PostToolConfirmationAdapter;
pub use pre_tool::PreToolPermissionAdapter;

/// Recognizer for one raw event shape.
pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pure shape check, no allocation of a request.
    fn can_handle(&self, event: &HookEvent) -> bool;

    /// Build the request, or `None` if the event turns out to be malformed.
    fn adapt(&self, event: &HookEvent, config: &HitlConfig) -> Option<HitlRequest>;
}

/// Ordered adapter list. Index 0 has the highest priority.
pub struct AdapterChain {
    adapters: Vec<Box<dyn Adapter>>,
}

impl AdapterChain {
    /// Built-in adapters: direct, pre-tool permission, post-tool
    /// confirmation, notification fallback.
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(DirectAdapter),
                Box::new(PreToolPermissionAdapter),
                Box::new(PostToolConfirmationAdapter),
                Box::new(NotificationAdapter),
            ],
        }
    }

    pub fn empty() -> Self {
        Self { adapters: Vec::new() }
    }

    /// Add at the lowest priority.
    pub fn append(&mut self, adapter: Box<dyn Adapter>) {
        self.adapters.push(adapter);
    }

    /// Add at the highest priority.
    pub fn prepend(&mut self, adapter: Box<dyn Adapter>) {
        self.adapters.insert(0, adapter);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Cheap classification without building a request.
    pub fn is_hitl_event(&self, event: &HookEvent) -> bool {
        self.adapters.iter().any(|a| a.can_handle(event))
    }

    pub fn adapt(&self, event: &HookEvent, config: &HitlConfig) -> Option<HitlRequest> {
        let Some(adapter) = self.adapters.iter().find(|a| a.can_handle(event)) else {
            tracing::debug!(
                hook_event_type = %event.hook_event_type,
                "no HITL adapter matched event"
            );
            return None;
        };

        let request = adapter.adapt(event, config);
        match &request {
            Some(req) => tracing::debug!(
                adapter = adapter.name(),
                kind = %req.kind,
                "event adapted to HITL request"
            ),
            None => tracing::warn!(
                adapter = adapter.name(),
                hook_event_type = %event.hook_event_type,
                "adapter matched event but it was malformed"
            ),
        }
        request
    }
}

impl Default for AdapterChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy the listed string/JSON fields of `source` into `context` when present.
pub(crate) fn copy_fields(source: &Map<String, Value>, keys: &[&str], context: &mut Map<String, Value>) {
    for key in keys {
        if let Some(value) = source.get(*key).filter(|v| !v.is_null()) {
            context.insert((*key).to_string(), value.clone());
        }
    }
}
