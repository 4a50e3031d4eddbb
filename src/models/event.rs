use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// HITL descriptor an agent attaches directly to an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitlDescriptor {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub response_web_socket_url: Option<String>,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
    #[serde(default)]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub requires_response: Option<bool>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

/// Raw event pushed by the ingestion pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookEvent {
    /// Numeric or string identifier; see [`HookEvent::stable_id`].
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub source_app: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub hook_event_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default, rename = "humanInTheLoop")]
    pub human_in_the_loop: Option<HitlDescriptor>,
}

impl HookEvent {
    pub fn new(hook_event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            hook_event_type: hook_event_type.into(),
            payload: match payload {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_hitl(mut self, descriptor: HitlDescriptor) -> Self {
        self.human_in_the_loop = Some(descriptor);
        self
    }

    /// Identifier usable as a pending-table key. Integers and non-empty
    /// strings qualify; anything else does not.
    pub fn stable_id(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn payload_bool(&self, key: &str) -> bool {
        self.payload.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Response destination carried in the payload, in either casing.
    pub fn payload_destination(&self) -> Option<&str> {
        self.payload_str("response_websocket_url")
            .or_else(|| self.payload_str("responseWebSocketUrl"))
            .filter(|s| !s.trim().is_empty())
    }

    pub fn payload_timeout(&self) -> Option<i64> {
        self.payload.get("timeout").and_then(Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stable_id_accepts_numbers_and_strings() {
        assert_eq!(HookEvent::default().with_id(1).stable_id().as_deref(), Some("1"));
        assert_eq!(HookEvent::default().with_id("evt-9").stable_id().as_deref(), Some("evt-9"));
        assert_eq!(HookEvent::default().with_id("  ").stable_id(), None);
        assert_eq!(HookEvent::default().with_id(1.5).stable_id(), None);
        assert_eq!(HookEvent::default().stable_id(), None);
    }

    #[test]
    fn test_deserialize_direct_event() {
        let event: HookEvent = serde_json::from_value(json!({
            "id": 1,
            "hook_event_type": "HumanInTheLoop",
            "humanInTheLoop": {
                "type": "question",
                "question": "Color?",
                "responseWebSocketUrl": "ws://localhost:4000/hitl",
                "timeout": 60
            }
        }))
        .unwrap();

        let hitl = event.human_in_the_loop.unwrap();
        assert_eq!(hitl.kind.as_deref(), Some("question"));
        assert_eq!(hitl.timeout, Some(60));
        assert_eq!(hitl.response_web_socket_url.as_deref(), Some("ws://localhost:4000/hitl"));
        assert!(hitl.requires_response.is_none());
    }

    #[test]
    fn test_payload_destination_ignores_blank() {
        let event = HookEvent::new("PreToolUse", json!({"response_websocket_url": " "}));
        assert!(event.payload_destination().is_none());
        let event = HookEvent::new("PreToolUse", json!({"responseWebSocketUrl": "ws://localhost:1"}));
        assert_eq!(event.payload_destination(), Some("ws://localhost:1"));
    }
}
