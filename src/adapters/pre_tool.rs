use serde_json::{Map, Value};

use super::{copy_fields, Adapter};
use crate::config::HitlConfig;
use crate::models::{HitlKind, HitlRequest, HookEvent};

/// Written file content is cut to this many characters in the context.
const CONTENT_PREVIEW_CHARS: usize = 500;

const CONTEXT_FIELDS: &[&str] = &[
    "command",
    "file_path",
    "old_string",
    "new_string",
    "description",
    "questions",
];

/// Tool calls the agent is about to make under `permission_mode: "ask"`.
pub struct PreToolPermissionAdapter;

impl Adapter for PreToolPermissionAdapter {
    fn name(&self) -> &'static str {
        "pre_tool_permission"
    }

    fn can_handle(&self, event: &HookEvent) -> bool {
        event.payload_str("permission_mode") == Some("ask") && event.payload_str("tool_name").is_some()
    }

    fn adapt(&self, event: &HookEvent, _config: &HitlConfig) -> Option<HitlRequest> {
        let tool = event.payload_str("tool_name")?;
        let Some(url) = event.payload_destination() else {
            tracing::warn!(tool, "pre-tool permission event has no response destination");
            return None;
        };

        let empty = Map::new();
        let input = event
            .payload
            .get("tool_input")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let mut context = Map::new();
        context.insert("tool_name".into(), Value::String(tool.to_string()));
        copy_fields(input, CONTEXT_FIELDS, &mut context);
        if let Some(path) = input.get("path").and_then(Value::as_str) {
            context
                .entry("file_path")
                .or_insert_with(|| Value::String(path.to_string()));
        }
        if let Some(content) = input.get("content").and_then(Value::as_str) {
            let preview: String = content.chars().take(CONTENT_PREVIEW_CHARS).collect();
            context.insert("content".into(), Value::String(preview));
        }

        Some(HitlRequest {
            kind: HitlKind::Approval,
            question: permission_question(tool, input),
            response_web_socket_url: url.to_string(),
            choices: None,
            timeout: event.payload_timeout(),
            requires_response: true,
            context,
        })
    }
}

fn permission_question(tool: &str, input: &Map<String, Value>) -> String {
    let field = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or_default();
    let path = || {
        input
            .get("file_path")
            .or_else(|| input.get("path"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    };

    match tool {
        "Bash" => format!("Allow command: `{}`?", field("command")),
        "Edit" | "MultiEdit" => format!("Allow edit to `{}`?", path()),
        "Write" => format!("Allow write to `{}`?", path()),
        "Read" => format!("Allow read of `{}`?", path()),
        "Task" => format!("Allow sub-agent task \"{}\"?", field("description")),
        "AskUserQuestion" => input
            .get("questions")
            .and_then(Value::as_array)
            .and_then(|qs| qs.first())
            .and_then(|q| q.get("question"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown question")
            .to_string(),
        "ExitPlanMode" => "Ready to execute the plan?".to_string(),
        "EnterPlanMode" => "Start planning?".to_string(),
        other => format!("Allow `{}`?", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(tool: &str, input: Value) -> HookEvent {
        HookEvent::new(
            "PreToolUse",
            json!({
                "permission_mode": "ask",
                "tool_name": tool,
                "tool_input": input,
                "response_websocket_url": "ws://localhost:4000/ws",
            }),
        )
    }

    fn adapt(event: &HookEvent) -> HitlRequest {
        PreToolPermissionAdapter
            .adapt(event, &HitlConfig::default())
            .expect("adapted")
    }

    #[test]
    fn test_bash_command_is_quoted() {
        let req = adapt(&event("Bash", json!({"command": "rm -rf /tmp/x"})));
        assert_eq!(req.kind, HitlKind::Approval);
        assert!(req.question.contains("rm -rf /tmp/x"));
        assert_eq!(req.context["tool_name"], "Bash");
        assert_eq!(req.context["command"], "rm -rf /tmp/x");
        assert_eq!(req.timeout, None);
    }

    #[test]
    fn test_edit_carries_diff() {
        let req = adapt(&event(
            "Edit",
            json!({"file_path": "src/main.rs", "old_string": "a", "new_string": "b"}),
        ));
        assert!(req.question.contains("src/main.rs"));
        assert_eq!(req.context["old_string"], "a");
        assert_eq!(req.context["new_string"], "b");
    }

    #[test]
    fn test_write_content_is_truncated() {
        let long = "x".repeat(2_000);
        let req = adapt(&event("Write", json!({"file_path": ".env", "content": long})));
        assert!(req.question.contains(".env"));
        assert_eq!(req.context["content"].as_str().unwrap().len(), 500);
    }

    #[test]
    fn test_read_and_task_templates() {
        let req = adapt(&event("Read", json!({"file_path": "/etc/hosts"})));
        assert!(req.question.contains("/etc/hosts"));

        let req = adapt(&event("Task", json!({"description": "refactor parser"})));
        assert!(req.question.contains("\"refactor parser\""));
        assert_eq!(req.context["description"], "refactor parser");
    }

    #[test]
    fn test_unknown_tool_is_generic() {
        let req = adapt(&event("WebFetch", json!({"url": "https://example.com"})));
        assert_eq!(req.question, "Allow `WebFetch`?");
    }

    #[test]
    fn test_ask_user_question_uses_first_question() {
        let questions = json!([{"question": "Which database?"}, {"question": "Which port?"}]);
        let req = adapt(&event("AskUserQuestion", json!({"questions": questions})));
        assert_eq!(req.kind, HitlKind::Approval);
        assert_eq!(req.question, "Which database?");
        assert_eq!(req.context["questions"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_requires_ask_mode() {
        let e = HookEvent::new("PreToolUse", json!({"permission_mode": "default", "tool_name": "Bash"}));
        assert!(!PreToolPermissionAdapter.can_handle(&e));
    }

    #[test]
    fn test_declines_without_destination() {
        let e = HookEvent::new("PreToolUse", json!({"permission_mode": "ask", "tool_name": "Bash"}));
        assert!(PreToolPermissionAdapter.can_handle(&e));
        assert!(PreToolPermissionAdapter.adapt(&e, &HitlConfig::default()).is_none());
    }

    #[test]
    fn test_payload_timeout_is_kept() {
        let mut e = event("Bash", json!({"command": "ls"}));
        e.payload.insert("timeout".into(), json!(30));
        assert_eq!(adapt(&e).timeout, Some(30));
    }
}
