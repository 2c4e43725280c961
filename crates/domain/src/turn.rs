//! Turn request wire shape and the enums it carries.
//!
//! Unknown fields are ignored (serde default behavior); an invalid enum
//! value fails deserialization, which the API layer surfaces as a
//! validation error before any upstream work starts.

use serde::{Deserialize, Serialize};

/// The agent topology to run the turn under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    SqlOnly,
    MultiTool,
    Handoff,
    Magentic,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::SqlOnly => "sql_only",
            AgentMode::MultiTool => "multi_tool",
            AgentMode::Handoff => "handoff",
            AgentMode::Magentic => "magentic",
        }
    }
}

impl std::str::FromStr for AgentMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql_only" => Ok(AgentMode::SqlOnly),
            "multi_tool" => Ok(AgentMode::MultiTool),
            "handoff" => Ok(AgentMode::Handoff),
            "magentic" => Ok(AgentMode::Magentic),
            other => Err(format!("unknown agent mode: {other}")),
        }
    }
}

/// Which configured deployment answers the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    #[default]
    Primary,
    Secondary,
}

/// Reasoning effort for the document retrieval tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocEffort {
    Minimal,
    Low,
    Medium,
}

impl DocEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocEffort::Minimal => "minimal",
            DocEffort::Low => "low",
            DocEffort::Medium => "medium",
        }
    }
}

/// Reasoning effort for the primary model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelEffort {
    Low,
    Medium,
    High,
}

impl ModelEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelEffort::Low => "low",
            ModelEffort::Medium => "medium",
            ModelEffort::High => "high",
        }
    }
}

/// Whether and how the model summarizes its reasoning for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummary {
    Off,
    Auto,
    Concise,
    Detailed,
}

impl ReasoningSummary {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningSummary::Off => "off",
            ReasoningSummary::Auto => "auto",
            ReasoningSummary::Concise => "concise",
            ReasoningSummary::Detailed => "detailed",
        }
    }
}

/// The turn endpoint request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Conversation id; empty means "start a new conversation".
    #[serde(default)]
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub agent_mode: Option<AgentMode>,
    /// Doc retrieval effort.
    #[serde(default)]
    pub reasoning_effort: Option<DocEffort>,
    #[serde(default)]
    pub model: Option<ModelChoice>,
    /// Only meaningful for the secondary model.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Primary model reasoning effort.
    #[serde(default)]
    pub model_reasoning_effort: Option<ModelEffort>,
    #[serde(default)]
    pub reasoning_summary: Option<ReasoningSummary>,
}

impl TurnRequest {
    /// Fail-fast checks that don't need any upstream: a non-empty query and
    /// a temperature inside the accepted range.
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(format!("temperature {t} is outside the range 0..2"));
            }
        }
        Ok(())
    }
}
