use serde_json::{Map, Value};

use super::Adapter;
use crate::config::HitlConfig;
use crate::models::{normalize_type, HitlRequest, HookEvent};

pub const NOTIFICATION_EVENT: &str = "Notification";

/// Notification sub-types that ask for a human: two legacy names, then the
/// canonical ones.
pub const RECOGNIZED_TYPES: &[&str] = &[
    "permission_prompt",
    "idle_prompt",
    "question",
    "permission",
    "choice",
    "approval",
];

const DEFAULT_MESSAGE: &str = "No message provided";

/// Lowest-priority fallback for generic notification events.
pub struct NotificationAdapter;

impl Adapter for NotificationAdapter {
    fn name(&self) -> &'static str {
        "notification"
    }

    fn can_handle(&self, event: &HookEvent) -> bool {
        event.hook_event_type == NOTIFICATION_EVENT
            && event
                .payload_str("notification_type")
                .is_some_and(|t| RECOGNIZED_TYPES.contains(&t))
    }

    fn adapt(&self, event: &HookEvent, _config: &HitlConfig) -> Option<HitlRequest> {
        let notification_type = event.payload_str("notification_type")?;
        let Some(url) = event.payload_destination() else {
            tracing::warn!(notification_type, "notification event has no response destination");
            return None;
        };

        let question = event
            .payload_str("message")
            .or_else(|| event.payload_str("question"))
            .unwrap_or(DEFAULT_MESSAGE);

        let choices = event.payload.get("choices").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect::<Vec<_>>()
        });

        let mut context = event
            .payload
            .get("context")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(Map::new);
        context.insert(
            "notification_type".into(),
            Value::String(notification_type.to_string()),
        );

        Some(HitlRequest {
            kind: normalize_type(Some(notification_type)),
            question: question.to_string(),
            response_web_socket_url: url.to_string(),
            choices,
            timeout: event.payload_timeout(),
            requires_response: true,
            context,
        })
    }
}
