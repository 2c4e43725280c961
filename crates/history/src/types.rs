use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fm_domain::tool::{Citation, ToolEventRecord};

/// A conversation row. `updated_at` advances monotonically with each
/// append; `title` is generated from the first user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role of a stored message. `Error` marks a turn that terminated with a
/// user-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Error,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Error => "error",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "error" => Ok(MessageRole::Error),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// A stored message. Append-only: edits arrive as new user messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_events: Option<Vec<ToolEventRecord>>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(
        conversation_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            citations: None,
            tool_events: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::Error] {
            assert_eq!(role.as_str().parse::<MessageRole>().unwrap(), role);
        }
    }

    #[test]
    fn message_serializes_without_empty_optionals() {
        let msg = StoredMessage::new("c1", MessageRole::User, "hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("citations"));
        assert!(!json.contains("tool_events"));
    }
}
