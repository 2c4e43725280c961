use super::{env_bool, env_string, env_u64};
use crate::turn::AgentMode;

/// Orchestrator runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// `AGENT_MODE` — default mode when the request omits one.
    pub default_mode: AgentMode,
    /// `DEMO_MODE` — deterministic canned upstreams (default false).
    pub demo_mode: bool,
    /// Cap on model↔tool rounds within one turn (default 8).
    pub max_tool_rounds: usize,
    /// Per-turn wall-clock budget, seconds (default 300).
    pub turn_budget_secs: u64,
    /// Conversation thread cache: idle TTL, seconds (default 1800).
    pub thread_ttl_secs: u64,
    /// Conversation thread cache: capacity (default 256).
    pub thread_cache_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_mode: AgentMode::MultiTool,
            demo_mode: false,
            max_tool_rounds: 8,
            turn_budget_secs: 300,
            thread_ttl_secs: 1800,
            thread_cache_capacity: 256,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let default_mode = env_string("AGENT_MODE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(AgentMode::MultiTool);
        Self {
            default_mode,
            demo_mode: env_bool("DEMO_MODE", false),
            max_tool_rounds: env_u64("MAX_TOOL_ROUNDS", 8) as usize,
            turn_budget_secs: env_u64("TURN_BUDGET_SECONDS", 300),
            thread_ttl_secs: env_u64("THREAD_TTL_SECONDS", 1800),
            thread_cache_capacity: env_u64("THREAD_CACHE_CAPACITY", 256) as usize,
        }
    }
}
