use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The five interaction kinds a human can be asked for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HitlKind {
    Question,
    Permission,
    Choice,
    Approval,
    QuestionInput,
}

impl HitlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitlKind::Question => "question",
            HitlKind::Permission => "permission",
            HitlKind::Choice => "choice",
            HitlKind::Approval => "approval",
            HitlKind::QuestionInput => "question_input",
        }
    }
}

impl std::fmt::Display for HitlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legacy notification names plus every canonical spelling.
const TYPE_ALIASES: &[(&str, HitlKind)] = &[
    ("question", HitlKind::Question),
    ("permission", HitlKind::Permission),
    ("choice", HitlKind::Choice),
    ("approval", HitlKind::Approval),
    ("question_input", HitlKind::QuestionInput),
    ("questioninput", HitlKind::QuestionInput),
    // legacy
    ("permission_prompt", HitlKind::Permission),
    ("idle_prompt", HitlKind::Question),
];

/// Map a raw type string onto a canonical kind.
///
/// Lookup is case-insensitive. Missing, empty, or unknown input falls back to
/// [`HitlKind::Question`] rather than being rejected.
pub fn normalize_type(raw: Option<&str>) -> HitlKind {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        tracing::debug!("no HITL type given, defaulting to question");
        return HitlKind::Question;
    };

    let lowered = raw.to_ascii_lowercase();
    match TYPE_ALIASES.iter().find(|(name, _)| *name == lowered) {
        Some((_, kind)) => *kind,
        None => {
            tracing::warn!(hitl_type = raw, "unrecognized HITL type, defaulting to question");
            HitlKind::Question
        }
    }
}

/// Canonical request produced by the adapter chain. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HitlRequest {
    #[serde(rename = "type")]
    pub kind: HitlKind,
    pub question: String,
    pub response_web_socket_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    /// Seconds; `None` means the service default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    pub requires_response: bool,
    #[serde(default)]
    pub context: Map<String, Value>,
}

/// Human answer to a pending request. Only the fields relevant to the
/// request's kind are populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HitlResponse {
    #[serde(default)]
    pub request_id: String,
    /// Unix milliseconds.
    #[serde(default)]
    pub responded_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
}

impl HitlResponse {
    pub fn text(request_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            responded_at: Utc::now().timestamp_millis(),
            response: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn permission(request_id: impl Into<String>, granted: bool) -> Self {
        Self {
            request_id: request_id.into(),
            responded_at: Utc::now().timestamp_millis(),
            permission: Some(granted),
            ..Default::default()
        }
    }

    pub fn choice(request_id: impl Into<String>, choice: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            responded_at: Utc::now().timestamp_millis(),
            choice: Some(choice.into()),
            ..Default::default()
        }
    }

    pub fn approval(request_id: impl Into<String>, approved: bool, comment: Option<String>) -> Self {
        Self {
            request_id: request_id.into(),
            responded_at: Utc::now().timestamp_millis(),
            approved: Some(approved),
            comment,
            ..Default::default()
        }
    }

    pub fn cancelled(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            responded_at: Utc::now().timestamp_millis(),
            cancelled: Some(true),
            ..Default::default()
        }
    }
}

/// Terminal status reported to the status sink. A request is `pending`
/// until one of these is emitted for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HitlStatus {
    Responded {
        response: HitlResponse,
    },
    Timeout {
        #[serde(rename = "timedOutAt")]
        timed_out_at: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl HitlStatus {
    pub fn label(&self) -> &'static str {
        match self {
            HitlStatus::Responded { .. } => "responded",
            HitlStatus::Timeout { .. } => "timeout",
            HitlStatus::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_canonical_names() {
        assert_eq!(normalize_type(Some("question")), HitlKind::Question);
        assert_eq!(normalize_type(Some("permission")), HitlKind::Permission);
        assert_eq!(normalize_type(Some("choice")), HitlKind::Choice);
        assert_eq!(normalize_type(Some("approval")), HitlKind::Approval);
        assert_eq!(normalize_type(Some("question_input")), HitlKind::QuestionInput);
    }

    #[test]
    fn test_normalize_is_case_insensitive() {
        assert_eq!(normalize_type(Some("APPROVAL")), HitlKind::Approval);
        assert_eq!(normalize_type(Some("Permission_Prompt")), HitlKind::Permission);
    }

    #[test]
    fn test_normalize_legacy_names() {
        assert_eq!(normalize_type(Some("permission_prompt")), HitlKind::Permission);
        assert_eq!(normalize_type(Some("idle_prompt")), HitlKind::Question);
    }

    #[test]
    fn test_normalize_lenient_default() {
        assert_eq!(normalize_type(None), HitlKind::Question);
        assert_eq!(normalize_type(Some("")), HitlKind::Question);
        assert_eq!(normalize_type(Some("launch_missiles")), HitlKind::Question);
    }

    #[test]
    fn test_status_serializes_with_tag() {
        let status = HitlStatus::Error { message: "boom".into() };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "boom");
        assert_eq!(status.label(), "error");
    }

    #[test]
    fn test_response_parses_partial_payload() {
        let resp: HitlResponse = serde_json::from_str(r#"{"response":"Blue"}"#).unwrap();
        assert_eq!(resp.response.as_deref(), Some("Blue"));
        assert!(resp.permission.is_none());
        assert_eq!(resp.request_id, "");
    }

    #[test]
    fn test_request_uses_wire_field_names() {
        let req = HitlRequest {
            kind: HitlKind::QuestionInput,
            question: "Which db?".into(),
            response_web_socket_url: "ws://localhost:4000".into(),
            choices: None,
            timeout: Some(30),
            requires_response: true,
            context: Map::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "question_input");
        assert_eq!(json["responseWebSocketUrl"], "ws://localhost:4000");
        assert_eq!(json["requiresResponse"], true);
    }
}
