//! End-to-end turn flows through the demo clients and canned tools.
//!
//! These tests drive the orchestrator the way the HTTP layer does and
//! check the stream-ordering guarantees, chart shaping, handoff routing,
//! cancellation, and persistence without any network upstream.

use std::sync::Arc;
use std::time::Duration;

use fm_domain::config::Config;
use fm_domain::tool::ToolPhase;
use fm_domain::turn::{AgentMode, ModelChoice};
use fm_gateway::runtime::cache::ThreadCache;
use fm_gateway::runtime::cancel::CancelMap;
use fm_gateway::runtime::encoder;
use fm_gateway::runtime::locks::TurnLockMap;
use fm_gateway::runtime::{run_turn, TurnFrame, TurnInput};
use fm_gateway::state::AppState;
use fm_history::{MemoryHistoryStore, MessageRole};
use fm_llm::{LlmClients, ReasoningControls};
use fm_tools::canned::CannedTool;
use fm_tools::ToolCatalog;

fn demo_state() -> AppState {
    let mut config = Config::default();
    config.runtime.demo_mode = true;

    let mut catalog = ToolCatalog::new();
    for tool in CannedTool::demo_set() {
        catalog.register(Arc::new(tool));
    }

    AppState {
        config: Arc::new(config.clone()),
        llm: Arc::new(LlmClients::from_config(&config.llm, true).unwrap()),
        catalog: Arc::new(catalog),
        history: MemoryHistoryStore::new(),
        threads: Arc::new(ThreadCache::new(8, Duration::from_secs(60))),
        cancel_map: Arc::new(CancelMap::new()),
        turn_locks: Arc::new(TurnLockMap::new()),
    }
}

fn input(mode: AgentMode, conversation_id: Option<&str>, query: &str) -> TurnInput {
    TurnInput {
        user_id: "tester".into(),
        conversation_id: conversation_id.map(String::from),
        query: query.into(),
        mode,
        model: ModelChoice::Primary,
        temperature: None,
        doc_effort: None,
        reasoning: ReasoningControls::default(),
    }
}

async fn collect(state: AppState, input: TurnInput) -> Vec<TurnFrame> {
    let (_turn_id, mut rx) = run_turn(state, input);
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    frames
}

fn terminal_count(frames: &[TurnFrame]) -> usize {
    frames
        .iter()
        .filter(|f| matches!(f, TurnFrame::Done | TurnFrame::Error { .. }))
        .count()
}

/// Every success/error tool event must be preceded by exactly one start
/// with the same (tool, occurrence) pair.
fn assert_tool_pairing(frames: &[TurnFrame]) {
    let mut started: Vec<(String, u32)> = Vec::new();
    for frame in frames {
        if let TurnFrame::Tool(event) = frame {
            let key = (event.tool.clone(), event.occurrence);
            match event.phase {
                ToolPhase::Start => {
                    assert!(
                        !started.contains(&key),
                        "duplicate start for {key:?}"
                    );
                    started.push(key);
                }
                ToolPhase::Success | ToolPhase::Error => {
                    assert!(
                        started.contains(&key),
                        "result without start for {key:?}"
                    );
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn sql_only_turn_streams_answer_and_persists() {
    let state = demo_state();
    let history = state.history.clone();

    let frames = collect(
        state,
        input(AgentMode::SqlOnly, Some("conv-sql"), "Top 3 products this month"),
    )
    .await;

    assert_eq!(terminal_count(&frames), 1);
    assert!(matches!(frames.last().unwrap(), TurnFrame::Done));
    assert_tool_pairing(&frames);

    // One sql_query start/success pair.
    let sql_events: Vec<_> = frames
        .iter()
        .filter_map(|f| match f {
            TurnFrame::Tool(e) if e.tool == "sql_query" => Some(e.phase),
            _ => None,
        })
        .collect();
    assert_eq!(sql_events, vec![ToolPhase::Start, ToolPhase::Success]);

    // Accumulated text names the three products; no chart frame.
    let text = frames
        .iter()
        .rev()
        .find_map(|f| match f {
            TurnFrame::Text { accumulated } => Some(accumulated.clone()),
            _ => None,
        })
        .expect("text frames present");
    for product in ["Mountain-200", "Road-250", "Touring-1000"] {
        assert!(text.contains(product), "missing {product} in {text}");
    }
    assert!(!frames.iter().any(|f| matches!(f, TurnFrame::Chart(_))));

    // Conversation persisted with the user/assistant pair.
    let messages = history.list_messages("conv-sql").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert!(messages[1].content.contains("Mountain-200"));
    assert!(messages[1].tool_events.is_some());
}

#[tokio::test]
async fn chart_intent_turn_emits_chart_payload() {
    let state = demo_state();
    let history = state.history.clone();

    let frames = collect(
        state,
        input(
            AgentMode::MultiTool,
            Some("conv-chart"),
            "月別売上を折れ線グラフで",
        ),
    )
    .await;

    assert_eq!(terminal_count(&frames), 1);
    let chart = frames
        .iter()
        .find_map(|f| match f {
            TurnFrame::Chart(payload) => Some(payload.clone()),
            _ => None,
        })
        .expect("chart frame present");
    assert_eq!(chart["chartType"], "line");
    assert_eq!(chart["data"]["labels"].as_array().unwrap().len(), 12);

    // The persisted assistant content is the serialized chart object.
    let messages = history.list_messages("conv-chart").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].content, chart.to_string());
}

#[tokio::test]
async fn handoff_transfers_to_doc_specialist_by_content() {
    let state = demo_state();

    let frames = collect(
        state,
        input(
            AgentMode::Handoff,
            Some("conv-handoff"),
            "Show product spec for Mountain-200",
        ),
    )
    .await;

    assert_eq!(terminal_count(&frames), 1);
    assert_tool_pairing(&frames);

    // Triage transferred exactly once, to the doc specialist.
    let transfers: Vec<String> = frames
        .iter()
        .filter_map(|f| match f {
            TurnFrame::Tool(e)
                if e.tool.starts_with("transfer_to_") && e.phase == ToolPhase::Start =>
            {
                Some(e.tool.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(transfers, vec!["transfer_to_doc_agent".to_string()]);

    // The final answer is the specialist's.
    let text = frames
        .iter()
        .rev()
        .find_map(|f| match f {
            TurnFrame::Text { accumulated } => Some(accumulated.clone()),
            _ => None,
        })
        .expect("specialist answer present");
    assert!(text.contains("documentation"));
}

#[tokio::test]
async fn magentic_delegates_and_integrates() {
    let state = demo_state();

    let frames = collect(
        state,
        input(
            AgentMode::Magentic,
            Some("conv-magentic"),
            "Summarize sales performance",
        ),
    )
    .await;

    assert_eq!(terminal_count(&frames), 1);
    assert_tool_pairing(&frames);

    let tools: Vec<String> = frames
        .iter()
        .filter_map(|f| match f {
            TurnFrame::Tool(e) if e.phase == ToolPhase::Start => Some(e.tool.clone()),
            _ => None,
        })
        .collect();
    // The manager delegated, and the specialist ran its own tool.
    assert!(tools.contains(&"ask_sql_specialist".to_string()));
    assert!(tools.contains(&"sql_query".to_string()));

    let text = frames
        .iter()
        .rev()
        .find_map(|f| match f {
            TurnFrame::Text { accumulated } => Some(accumulated.clone()),
            _ => None,
        })
        .expect("manager answer present");
    assert!(!text.is_empty());
}

#[tokio::test]
async fn cancellation_before_output_persists_nothing() {
    let state = demo_state();
    let history = state.history.clone();
    let cancel_map = state.cancel_map.clone();

    let (_turn_id, mut rx) = run_turn(
        state,
        input(AgentMode::SqlOnly, Some("conv-cancel"), "Top products"),
    );
    // Cancel before the spawned turn gets to run.
    assert!(cancel_map.cancel("conv-cancel"));

    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }

    assert_eq!(terminal_count(&frames), 1);
    assert!(matches!(frames.last().unwrap(), TurnFrame::Done));
    assert!(!frames.iter().any(|f| matches!(f, TurnFrame::Text { .. })));

    // Cancelled before any output: no messages were persisted.
    let messages = history.list_messages("conv-cancel").await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn same_conversation_reuses_thread_handle() {
    let state = demo_state();
    let threads = state.threads.clone();

    collect(
        state.clone(),
        input(AgentMode::SqlOnly, Some("conv-reuse"), "Top products"),
    )
    .await;
    assert_eq!(threads.len(), 1);

    collect(
        state,
        input(AgentMode::SqlOnly, Some("conv-reuse"), "And last month?"),
    )
    .await;
    // Still exactly one live handle for the conversation.
    assert_eq!(threads.len(), 1);
}

#[tokio::test]
async fn stream_decodes_to_persisted_message() {
    let state = demo_state();
    let history = state.history.clone();

    let frames = collect(
        state,
        input(AgentMode::SqlOnly, Some("conv-decode"), "Top 3 products this month"),
    )
    .await;

    // Encode everything (with keepalives sprinkled in) and decode it back.
    let mut raw = String::new();
    for frame in &frames {
        raw.push_str(&encoder::keepalive_unit());
        if let Some(unit) = encoder::encode(frame) {
            raw.push_str(&unit);
        }
    }
    let decoded = encoder::decode_stream(&raw);

    let messages = history.list_messages("conv-decode").await.unwrap();
    assert_eq!(decoded.text, messages[1].content);
    assert!(decoded.errors.is_empty());
    assert!(decoded.keepalives > 0);
}
