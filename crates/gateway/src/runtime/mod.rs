//! Core runtime — the orchestrator that ties mode topologies, the LLM
//! model loop, tool dispatch, chart shaping, and history persistence into
//! one deterministic per-turn driver.
//!
//! Entry point: [`run_turn`] takes a turn input and returns a channel of
//! [`TurnFrame`]s the API layer encodes onto the wire.

pub mod cache;
pub mod cancel;
pub mod chart;
pub mod encoder;
pub mod locks;
pub mod prompts;
pub mod topology;
pub mod turn;

pub use turn::{run_turn, TurnFrame, TurnInput};

use fm_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the assistant message that carries a step's text and tool calls
/// back into the conversation for the next model step.
pub(crate) fn assistant_tool_message(text: &str, tool_calls: &[ToolCall]) -> Message {
    let mut parts = Vec::new();

    if !text.is_empty() {
        parts.push(ContentPart::Text {
            text: text.to_string(),
        });
    }

    for tc in tool_calls {
        parts.push(ContentPart::ToolUse {
            id: tc.call_id.clone(),
            name: tc.tool_name.clone(),
            input: tc.arguments.clone(),
        });
    }

    Message {
        role: Role::Assistant,
        content: MessageContent::Parts(parts),
    }
}

/// Truncate on a char boundary with an ellipsis marker.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Short digest of tool arguments for the tool event record.
pub(crate) fn args_digest(args: &serde_json::Value) -> Option<String> {
    serde_json::to_string(args).ok().map(|s| truncate_str(&s, 120))
}
