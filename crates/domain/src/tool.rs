use serde::{Deserialize, Serialize};

/// Internal tool call format (client-shape agnostic).
/// Every LLM client converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool catalog entry exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// The uniform result contract every tool adapter produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text summary returned to the model as the tool result.
    pub text_summary: String,
    /// Optional structured payload (e.g. decoded SQL rows).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
    /// Citations derived from the tool output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Whether the output was cut at an internal cap.
    #[serde(default)]
    pub truncated: bool,
}

/// A tool invocation failure, kept separate from [`crate::Error`] so the
/// orchestrator can convert it into a `tool_error` event the model recovers
/// from instead of terminating the turn.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ToolFailure {
    pub message: String,
    /// Transient failures (timeouts, 5xx) may be worth a different approach
    /// by the model; permanent ones (bad arguments, permission) are not.
    pub transient: bool,
    /// Protocol error code, when the upstream speaks JSON-RPC.
    pub code: Option<i64>,
    /// Backoff hint from the upstream, milliseconds.
    pub retry_after_ms: Option<u64>,
}

impl ToolFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
            code: None,
            retry_after_ms: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
            code: None,
            retry_after_ms: None,
        }
    }
}

/// A reference attached to an assistant message pointing at a tool-produced
/// source. `index` is 1-based and assigned when the turn finalizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    #[serde(default)]
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

/// Tool lifecycle phase within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolPhase {
    Start,
    Success,
    Error,
}

/// A single tool lifecycle event, ordered per turn. Every `success` or
/// `error` is preceded by exactly one `start` with the same
/// `(tool, occurrence)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEventRecord {
    pub tool: String,
    pub phase: ToolPhase,
    /// Per-tool occurrence index within the turn (first call = 1).
    pub occurrence: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ToolEventRecord {
    pub fn start(tool: impl Into<String>, occurrence: u32, args_digest: Option<String>) -> Self {
        Self {
            tool: tool.into(),
            phase: ToolPhase::Start,
            occurrence,
            args_digest,
            latency_ms: None,
            result_summary: None,
            error: None,
            error_code: None,
            retry_after_ms: None,
        }
    }

    pub fn success(
        tool: impl Into<String>,
        occurrence: u32,
        latency_ms: u64,
        result_summary: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            phase: ToolPhase::Success,
            occurrence,
            args_digest: None,
            latency_ms: Some(latency_ms),
            result_summary: Some(result_summary.into()),
            error: None,
            error_code: None,
            retry_after_ms: None,
        }
    }

    pub fn error(
        tool: impl Into<String>,
        occurrence: u32,
        latency_ms: u64,
        failure: &ToolFailure,
    ) -> Self {
        Self {
            tool: tool.into(),
            phase: ToolPhase::Error,
            occurrence,
            args_digest: None,
            latency_ms: Some(latency_ms),
            result_summary: None,
            error: Some(failure.message.clone()),
            error_code: failure.code,
            retry_after_ms: failure.retry_after_ms,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A message in the model conversation (client-shape agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error: false,
            }]),
        }
    }
    pub fn tool_error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error: true,
            }]),
        }
    }
}

impl MessageContent {
    /// Extract and join all text content, returning an owned String.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}
