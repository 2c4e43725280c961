use std::sync::Arc;

use fm_domain::config::Config;
use fm_history::HistoryStore;
use fm_llm::LlmClients;
use fm_tools::ToolCatalog;

use crate::runtime::cache::ThreadCache;
use crate::runtime::cancel::CancelMap;
use crate::runtime::locks::TurnLockMap;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, LLM clients, tool catalog, history store
/// - **Per-turn coordination** — thread cache, cancel map, turn locks
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<LlmClients>,
    pub catalog: Arc<ToolCatalog>,
    pub history: Arc<dyn HistoryStore>,

    // ── Per-turn coordination ─────────────────────────────────────────
    /// Conversation id → live provider thread handle.
    pub threads: Arc<ThreadCache>,
    /// Active cancellation tokens keyed by conversation/turn.
    pub cancel_map: Arc<CancelMap>,
    /// One running turn per conversation.
    pub turn_locks: Arc<TurnLockMap>,
}
