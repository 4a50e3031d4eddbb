use super::Adapter;
use crate::config::HitlConfig;
use crate::models::{normalize_type, HitlRequest, HookEvent};

const DEFAULT_QUESTION: &str = "No question provided";

/// Events that already carry a `humanInTheLoop` descriptor.
pub struct DirectAdapter;

impl Adapter for DirectAdapter {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn can_handle(&self, event: &HookEvent) -> bool {
        event.human_in_the_loop.is_some()
    }

    fn adapt(&self, event: &HookEvent, config: &HitlConfig) -> Option<HitlRequest> {
        let hitl = event.human_in_the_loop.as_ref()?;

        let Some(url) = hitl
            .response_web_socket_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
        else {
            tracing::warn!("HITL descriptor has no responseWebSocketUrl");
            return None;
        };

        let question = hitl
            .question
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(DEFAULT_QUESTION);

        Some(HitlRequest {
            kind: normalize_type(hitl.kind.as_deref()),
            question: question.to_string(),
            response_web_socket_url: url.to_string(),
            choices: hitl.choices.clone(),
            timeout: Some(hitl.timeout.unwrap_or(config.default_timeout)),
            requires_response: hitl.requires_response.unwrap_or(true),
            context: hitl.context.clone().unwrap_or_default(),
        })
    }
}
