use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::tool::Citation;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted during LLM streaming (client-shape agnostic).
///
/// Both client shapes (Responses-style and Chat-style) translate their wire
/// formats into this surface so the orchestrator drives one loop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum CompletionEvent {
    /// An append-only text token chunk.
    #[serde(rename = "text_delta")]
    TextDelta { text: String },

    /// Model reasoning. `text` is the FULL cumulative thought string, not a
    /// delta — consumers replace their buffer rather than appending.
    #[serde(rename = "reasoning")]
    Reasoning { text: String },

    /// A tool call has started.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted { call_id: String, tool_name: String },

    /// Incremental tool call argument data.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    /// A tool call is complete with full arguments.
    #[serde(rename = "tool_call_finished")]
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// A grounding citation attached by the model to the running answer.
    #[serde(rename = "citation")]
    CitationAdded { citation: Citation },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
