use serde_json::{Map, Value};

use super::Adapter;
use crate::config::HitlConfig;
use crate::models::{HitlKind, HitlRequest, HookEvent};

/// Tool calls that just ran and were flagged `requires_confirmation`.
pub struct PostToolConfirmationAdapter;

impl Adapter for PostToolConfirmationAdapter {
    fn name(&self) -> &'static str {
        "post_tool_confirmation"
    }

    fn can_handle(&self, event: &HookEvent) -> bool {
        event.payload_bool("requires_confirmation") && event.payload_str("tool_name").is_some()
    }

    fn adapt(&self, event: &HookEvent, _config: &HitlConfig) -> Option<HitlRequest> {
        let tool = event.payload_str("tool_name")?;
        let Some(url) = event.payload_destination() else {
            tracing::warn!(tool, "post-tool confirmation event has no response destination");
            return None;
        };

        let question = event
            .payload_str("confirmation_message")
            .filter(|m| !m.trim().is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("Confirm `{}` result?", tool));

        let mut context = Map::new();
        context.insert("tool_name".into(), Value::String(tool.to_string()));
        if let Some(result) = event
            .payload
            .get("tool_response")
            .or_else(|| event.payload.get("tool_result"))
        {
            context.insert("tool_response".into(), result.clone());
        }

        Some(HitlRequest {
            kind: HitlKind::Approval,
            question,
            response_web_socket_url: url.to_string(),
            choices: None,
            timeout: event.payload_timeout(),
            requires_response: true,
            context,
        })
    }
}
