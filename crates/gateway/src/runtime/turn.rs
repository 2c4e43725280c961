//! Turn execution loop — the orchestrator that streams LLM responses,
//! dispatches tool calls, shapes chart answers, and persists the exchange.
//!
//! Entry point: [`run_turn`] spawns the async loop and returns a channel
//! of [`TurnFrame`]s.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::Instrument;

use fm_domain::cancel::CancelToken;
use fm_domain::error::{Error, Result};
use fm_domain::stream::CompletionEvent;
use fm_domain::tool::{
    Citation, Message, ToolCall, ToolEventRecord, ToolFailure, ToolSpec,
};
use fm_domain::turn::{AgentMode, DocEffort, ModelChoice};
use fm_history::{Conversation, MessageRole, StoredMessage};
use fm_llm::{ClientShape, CompletionRequest, LlmClient, ReasoningControls};
use fm_tools::validate_args;

use crate::state::AppState;

use super::chart;
use super::topology::{self, AgentDef, Topology};
use super::{args_digest, assistant_tool_message, truncate_str};

/// Cap on model↔tool rounds inside a specialist sub-loop.
const MAX_CHILD_ROUNDS: usize = 4;
/// Budget for the persistence attempt after the stream is done.
const PERSIST_TIMEOUT: Duration = Duration::from_secs(5);
/// Preview length for tool result summaries on events.
const SUMMARY_PREVIEW: usize = 200;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnFrame — what the encoder puts on the wire
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Frames emitted during a single turn, in strict producer order. Exactly
/// one terminal frame (`Done` or `Error`) ends every turn.
#[derive(Debug, Clone)]
pub enum TurnFrame {
    /// Accumulated assistant text (consumers may replace their buffer).
    Text { accumulated: String },
    /// Cumulative reasoning text (REPLACE semantics).
    Reasoning { text: String },
    /// Tool lifecycle event.
    Tool(ToolEventRecord),
    /// Final citations together with the full text they belong to.
    Citations {
        accumulated: String,
        citations: Vec<Citation>,
    },
    /// Chart payload for a chart-intent turn.
    Chart(Value),
    /// Terminal error.
    Error { message: String },
    /// Terminal success (also ends cancelled turns).
    Done,
}

/// Input to a single turn, already validated by the API layer.
pub struct TurnInput {
    pub user_id: String,
    /// Empty/absent means "start a new conversation".
    pub conversation_id: Option<String>,
    pub query: String,
    pub mode: AgentMode,
    pub model: ModelChoice,
    /// Only applied to the secondary model.
    pub temperature: Option<f32>,
    /// Doc retrieval effort override for this turn.
    pub doc_effort: Option<DocEffort>,
    pub reasoning: ReasoningControls,
}

/// The cancel-map key for a turn: the conversation id when the client
/// supplied one, otherwise the turn id.
pub fn cancel_key_for(conversation_id: &Option<String>, turn_id: uuid::Uuid) -> String {
    conversation_id
        .clone()
        .unwrap_or_else(|| turn_id.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn — spawn the driver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn: resolve the conversation, build the topology, drive the
/// model loop, and persist the exchange.
///
/// Returns the turn id and a channel receiver of [`TurnFrame`]s. A cancel
/// token is registered under [`cancel_key_for`] so the cancel endpoint and
/// client disconnects can abort the turn cleanly.
pub fn run_turn(state: AppState, input: TurnInput) -> (uuid::Uuid, mpsc::Receiver<TurnFrame>) {
    let (tx, rx) = mpsc::channel::<TurnFrame>(64);
    let turn_id = uuid::Uuid::new_v4();
    let cancel_key = cancel_key_for(&input.conversation_id, turn_id);
    let cancel = state.cancel_map.register(&cancel_key);

    let span = tracing::info_span!(
        "turn",
        %turn_id,
        mode = input.mode.as_str(),
        user_id = %input.user_id,
    );

    tokio::spawn(
        async move {
            tracing::debug!("turn started");
            let result = run_turn_inner(&state, input, &tx, &cancel, turn_id).await;
            state.cancel_map.remove(&cancel_key);

            if let Err(e) = result {
                // Pre-drive failure (validation, unavailable upstream):
                // one terminal error frame, nothing persisted.
                tracing::warn!(%turn_id, error = %e, "turn failed before the model loop");
                let _ = tx
                    .send(TurnFrame::Error {
                        message: e.client_message(),
                    })
                    .await;
            }
        }
        .instrument(span),
    );

    (turn_id, rx)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inner driver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: &AppState,
    input: TurnInput,
    tx: &mpsc::Sender<TurnFrame>,
    cancel: &CancelToken,
    turn_id: uuid::Uuid,
) -> Result<()> {
    // ── Phase 1: conversation, topology, client, thread ──────────────
    let conversation = state
        .history
        .ensure_conversation(
            &input.user_id,
            input
                .conversation_id
                .as_deref()
                .filter(|id| !id.is_empty()),
            &input.query,
        )
        .await?;

    let topo = topology::build(input.mode, &state.catalog);
    let client = state.llm.for_shape(topo.shape)?;
    let thread_id = state
        .threads
        .acquire(&conversation.conversation_id, input.mode, client.clone())
        .await?;

    // ── Phase 2: assemble the opening messages ───────────────────────
    // The Responses shape carries history in the provider thread; the Chat
    // shape replays it from the store.
    let mut messages = vec![Message::system(topo.entry.instructions)];
    if topo.shape == ClientShape::Chat {
        messages.extend(replay_history(state, &conversation.conversation_id).await);
    }
    messages.push(Message::user(&input.query));

    let mut driver = TurnDriver {
        state,
        tx: tx.clone(),
        cancel: cancel.clone(),
        client,
        model: state.llm.deployment(input.model).to_string(),
        temperature: if input.model == ModelChoice::Secondary {
            input.temperature
        } else {
            None
        },
        reasoning: input.reasoning,
        doc_effort: input.doc_effort,
        thread_id: Some(thread_id),
        max_rounds: state.config.runtime.max_tool_rounds,
        accumulated: String::new(),
        citations: Vec::new(),
        tool_events: Vec::new(),
        occurrences: HashMap::new(),
        any_output: false,
    };

    // ── Phase 3: drive the model loop under the wall-clock budget ────
    let budget = Duration::from_secs(state.config.runtime.turn_budget_secs);
    let outcome = match tokio::time::timeout(budget, drive(&mut driver, &topo, messages)).await
    {
        Ok(result) => result,
        Err(_) => {
            cancel.cancel();
            Err(Error::Timeout(format!(
                "turn exceeded its {}s budget",
                budget.as_secs()
            )))
        }
    };

    // ── Phase 4: finalize frames + persistence ───────────────────────
    finalize(state, &input, &conversation, driver, outcome, tx, turn_id).await;
    Ok(())
}

/// How the model loop ended.
enum DriveOutcome {
    /// The model finished with a final answer in `driver.accumulated`.
    Final,
    /// The cancel token fired mid-loop.
    Cancelled,
    /// The round cap was hit.
    ToolLimit,
    /// The model stream emitted an error event.
    UpstreamError(String),
}

async fn drive(
    driver: &mut TurnDriver<'_>,
    topo: &Topology,
    messages: Vec<Message>,
) -> Result<DriveOutcome> {
    match topo.mode {
        AgentMode::SqlOnly | AgentMode::MultiTool => {
            drive_single(driver, &topo.entry, messages).await
        }
        AgentMode::Handoff => drive_handoff(driver, topo, messages).await,
        AgentMode::Magentic => drive_magentic(driver, topo, messages).await,
    }
}

// ── Single-agent loop (sql_only, multi_tool) ───────────────────────

async fn drive_single(
    driver: &mut TurnDriver<'_>,
    agent: &AgentDef,
    mut messages: Vec<Message>,
) -> Result<DriveOutcome> {
    let specs = driver.specs_for(agent);

    for round in 0..driver.max_rounds {
        tracing::debug!(round, agent = agent.name, "model step");
        let step = driver.model_step(&messages, &specs, true).await?;
        if step.cancelled {
            return Ok(DriveOutcome::Cancelled);
        }
        if let Some(message) = step.upstream_error {
            return Ok(DriveOutcome::UpstreamError(message));
        }
        if step.tool_calls.is_empty() {
            return Ok(DriveOutcome::Final);
        }

        messages.push(assistant_tool_message(&step.text, &step.tool_calls));
        let results = driver.execute_tools(&step.tool_calls, &specs).await;
        if driver.cancel.is_cancelled() {
            return Ok(DriveOutcome::Cancelled);
        }
        for (call, content, is_error) in results {
            messages.push(tool_result_message(&call, content, is_error));
        }
    }

    Ok(DriveOutcome::ToolLimit)
}

// ── Handoff loop ───────────────────────────────────────────────────

/// Triage may transfer control to exactly one specialist; the specialist's
/// answer is the turn's answer, with no re-merge. Transfer tools exist
/// only in the triage catalog, so a second transfer cannot occur.
async fn drive_handoff(
    driver: &mut TurnDriver<'_>,
    topo: &Topology,
    mut messages: Vec<Message>,
) -> Result<DriveOutcome> {
    let mut agent = topo.entry.clone();

    for round in 0..driver.max_rounds {
        tracing::debug!(round, agent = agent.name, "model step");
        let specs = driver.specs_for(&agent);
        let step = driver.model_step(&messages, &specs, true).await?;
        if step.cancelled {
            return Ok(DriveOutcome::Cancelled);
        }
        if let Some(message) = step.upstream_error {
            return Ok(DriveOutcome::UpstreamError(message));
        }
        if step.tool_calls.is_empty() {
            // A specialist (or triage itself) produced the answer. An
            // empty answer from the last specialist is a valid outcome.
            return Ok(DriveOutcome::Final);
        }

        let transfer = step
            .tool_calls
            .iter()
            .find_map(|c| {
                topology::transfer_target(&c.tool_name).map(|t| (c.clone(), t.to_string()))
            });

        if let Some((call, target)) = transfer {
            driver.emit_synthetic_tool(&call, &format!("transferred to {target} specialist")).await;
            messages.push(assistant_tool_message(&step.text, &[call.clone()]));
            messages.push(Message::tool_result(
                &call.call_id,
                format!("transferred to {target} specialist"),
            ));

            match topology::specialist(&target) {
                Some(next) => {
                    agent = next;
                    messages[0] = Message::system(agent.instructions);
                }
                None => {
                    messages.push(Message::tool_error(
                        &call.call_id,
                        format!("no such specialist: {target}"),
                    ));
                }
            }
            continue;
        }

        messages.push(assistant_tool_message(&step.text, &step.tool_calls));
        let results = driver.execute_tools(&step.tool_calls, &specs).await;
        if driver.cancel.is_cancelled() {
            return Ok(DriveOutcome::Cancelled);
        }
        for (call, content, is_error) in results {
            messages.push(tool_result_message(&call, content, is_error));
        }
    }

    Ok(DriveOutcome::ToolLimit)
}

// ── Magentic loop ──────────────────────────────────────────────────

/// The manager plans, delegates sub-tasks to specialists, and integrates
/// their answers into one final response. Each delegation runs a bounded
/// child loop whose text goes back to the manager, not to the client.
async fn drive_magentic(
    driver: &mut TurnDriver<'_>,
    topo: &Topology,
    mut messages: Vec<Message>,
) -> Result<DriveOutcome> {
    let manager_specs = driver.specs_for(&topo.entry);

    for round in 0..driver.max_rounds {
        tracing::debug!(round, agent = topo.entry.name, "model step");
        let step = driver.model_step(&messages, &manager_specs, true).await?;
        if step.cancelled {
            return Ok(DriveOutcome::Cancelled);
        }
        if let Some(message) = step.upstream_error {
            return Ok(DriveOutcome::UpstreamError(message));
        }
        if step.tool_calls.is_empty() {
            return Ok(DriveOutcome::Final);
        }

        messages.push(assistant_tool_message(&step.text, &step.tool_calls));

        for call in &step.tool_calls {
            if driver.cancel.is_cancelled() {
                return Ok(DriveOutcome::Cancelled);
            }

            let Some(target) = topology::delegate_target(&call.tool_name).map(String::from)
            else {
                messages.push(Message::tool_error(
                    &call.call_id,
                    format!("unknown tool: {}", call.tool_name),
                ));
                continue;
            };

            let task = match call.arguments.get("task").and_then(|t| t.as_str()) {
                Some(task) => task.to_string(),
                None => driver_task_fallback(&messages),
            };

            let occurrence = driver.next_occurrence(&call.tool_name);
            let start = ToolEventRecord::start(&call.tool_name, occurrence, args_digest(&call.arguments));
            driver.record_and_send(start).await;

            let t0 = Instant::now();
            let (answer, is_error) = match topology::specialist(&target) {
                Some(specialist) => driver.run_child(&specialist, &task).await?,
                None => (format!("no such specialist: {target}"), true),
            };
            let latency = t0.elapsed().as_millis() as u64;

            let event = if is_error {
                ToolEventRecord::error(
                    &call.tool_name,
                    occurrence,
                    latency,
                    &ToolFailure::permanent(truncate_str(&answer, SUMMARY_PREVIEW)),
                )
            } else {
                ToolEventRecord::success(
                    &call.tool_name,
                    occurrence,
                    latency,
                    truncate_str(&answer, SUMMARY_PREVIEW),
                )
            };
            driver.record_and_send(event).await;

            messages.push(if is_error {
                Message::tool_error(&call.call_id, &answer)
            } else {
                Message::tool_result(&call.call_id, &answer)
            });
        }
    }

    Ok(DriveOutcome::ToolLimit)
}

/// Fallback task text when the manager omitted the `task` argument: the
/// original user question.
fn driver_task_fallback(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.role == fm_domain::tool::Role::User)
        .map(|m| m.content.extract_all_text())
        .unwrap_or_default()
}

fn tool_result_message(call: &ToolCall, content: String, is_error: bool) -> Message {
    if is_error {
        Message::tool_error(&call.call_id, content)
    } else {
        Message::tool_result(&call.call_id, content)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnDriver — shared per-turn emission state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct TurnDriver<'a> {
    state: &'a AppState,
    tx: mpsc::Sender<TurnFrame>,
    cancel: CancelToken,
    client: std::sync::Arc<dyn LlmClient>,
    model: String,
    temperature: Option<f32>,
    reasoning: ReasoningControls,
    doc_effort: Option<DocEffort>,
    thread_id: Option<String>,
    max_rounds: usize,
    /// Full assistant text streamed to the client so far.
    accumulated: String,
    /// Citations gathered from tool outputs and model annotations.
    citations: Vec<Citation>,
    /// Every tool event emitted this turn, in order (persisted).
    tool_events: Vec<ToolEventRecord>,
    /// Per-tool occurrence counters.
    occurrences: HashMap<String, u32>,
    /// Whether any frame with user-visible output was produced.
    any_output: bool,
}

/// One model step's output.
#[derive(Default)]
struct StepOutput {
    text: String,
    tool_calls: Vec<ToolCall>,
    cancelled: bool,
    upstream_error: Option<String>,
}

impl<'a> TurnDriver<'a> {
    async fn send(&self, frame: TurnFrame) {
        let _ = self.tx.send(frame).await;
    }

    async fn record_and_send(&mut self, event: ToolEventRecord) {
        self.any_output = true;
        self.tool_events.push(event.clone());
        self.send(TurnFrame::Tool(event)).await;
    }

    fn next_occurrence(&mut self, tool: &str) -> u32 {
        let counter = self.occurrences.entry(tool.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Catalog specs for an agent's allowed tools plus its virtual tools.
    fn specs_for(&self, agent: &AgentDef) -> Vec<ToolSpec> {
        let mut specs = agent.virtual_tools.clone();
        specs.extend(self.state.catalog.specs_for(&agent.tools));
        specs
    }

    /// Run one streamed completion, forwarding frames as events arrive.
    ///
    /// `emit_text` is false for specialist sub-loops whose text goes back
    /// to the manager instead of the client.
    async fn model_step(
        &mut self,
        messages: &[Message],
        tools: &[ToolSpec],
        emit_text: bool,
    ) -> Result<StepOutput> {
        let req = CompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            temperature: self.temperature,
            reasoning: self.reasoning,
            thread_id: self.thread_id.clone(),
        };

        let mut stream = self.client.stream(req).await?;
        let mut out = StepOutput::default();
        // call_id → (tool_name, argument buffer) for calls still streaming.
        let mut tc_bufs: HashMap<String, (String, String)> = HashMap::new();

        while let Some(event) = stream.next().await {
            if self.cancel.is_cancelled() {
                out.cancelled = true;
                break;
            }

            match event? {
                CompletionEvent::TextDelta { text } => {
                    out.text.push_str(&text);
                    if emit_text {
                        self.accumulated.push_str(&text);
                        self.any_output = true;
                        self.send(TurnFrame::Text {
                            accumulated: self.accumulated.clone(),
                        })
                        .await;
                    }
                }
                CompletionEvent::Reasoning { text } => {
                    self.any_output = true;
                    self.send(TurnFrame::Reasoning { text }).await;
                }
                CompletionEvent::ToolCallStarted { call_id, tool_name } => {
                    tc_bufs.insert(call_id, (tool_name, String::new()));
                }
                CompletionEvent::ToolCallDelta { call_id, delta } => {
                    if let Some((_, args)) = tc_bufs.get_mut(&call_id) {
                        args.push_str(&delta);
                    }
                }
                CompletionEvent::ToolCallFinished {
                    call_id,
                    tool_name,
                    arguments,
                } => {
                    tc_bufs.remove(&call_id);
                    out.tool_calls.push(ToolCall {
                        call_id,
                        tool_name,
                        arguments,
                    });
                }
                CompletionEvent::CitationAdded { citation } => {
                    self.citations.push(citation);
                }
                CompletionEvent::Done { .. } => {}
                CompletionEvent::Error { message } => {
                    out.upstream_error = Some(message);
                    break;
                }
            }
        }

        // Assemble calls that streamed start/delta but no finish.
        for (call_id, (name, args)) in tc_bufs.drain() {
            let arguments = if args.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&args).unwrap_or_else(|e| {
                    tracing::warn!(
                        call_id = %call_id,
                        tool = %name,
                        error = %e,
                        "tool call arguments are not valid JSON; defaulting to empty object"
                    );
                    Value::Object(Default::default())
                })
            };
            out.tool_calls.push(ToolCall {
                call_id,
                tool_name: name,
                arguments,
            });
        }

        Ok(out)
    }

    /// Dispatch a step's tool calls: validate, emit `start` events in
    /// model order, run the batch concurrently, and emit results back in
    /// model order so frame ordering is deterministic.
    async fn execute_tools(
        &mut self,
        calls: &[ToolCall],
        specs: &[ToolSpec],
    ) -> Vec<(ToolCall, String, bool)> {
        // 1. Occurrence indices, argument validation, start events.
        let mut metas: Vec<(u32, Option<String>)> = Vec::new();
        for call in calls {
            let occurrence = self.next_occurrence(&call.tool_name);
            let start =
                ToolEventRecord::start(&call.tool_name, occurrence, args_digest(&call.arguments));
            self.record_and_send(start).await;

            let validation = match specs.iter().find(|s| s.name == call.tool_name) {
                Some(spec) => validate_args(spec, &call.arguments).err(),
                None => Some(format!("unknown tool: {}", call.tool_name)),
            };
            metas.push((occurrence, validation));
        }

        // 2. Dispatch concurrently; latency = max, not sum. Invalid calls
        //    resolve immediately with a permanent failure.
        let futures: Vec<_> = calls
            .iter()
            .zip(metas.iter())
            .map(|(call, (_, validation_err))| {
                let catalog = self.state.catalog.clone();
                let cancel = self.cancel.clone();
                let name = call.tool_name.clone();
                let args = self.with_doc_effort(call);
                let validation_err = validation_err.clone();
                async move {
                    let t0 = Instant::now();
                    let result = match validation_err {
                        Some(message) => Err(ToolFailure::permanent(message)),
                        None => catalog.dispatch(&name, args, cancel).await,
                    };
                    (result, t0.elapsed().as_millis() as u64)
                }
            })
            .collect();
        let results = futures_util::future::join_all(futures).await;

        // 3. Emit results in model order.
        let mut out = Vec::new();
        for ((call, (occurrence, _)), (result, latency)) in
            calls.iter().zip(metas).zip(results)
        {
            match result {
                Ok(output) => {
                    let event = ToolEventRecord::success(
                        &call.tool_name,
                        occurrence,
                        latency,
                        truncate_str(&output.text_summary, SUMMARY_PREVIEW),
                    );
                    self.record_and_send(event).await;
                    self.citations.extend(output.citations);
                    out.push((call.clone(), output.text_summary, false));
                }
                Err(failure) => {
                    let event =
                        ToolEventRecord::error(&call.tool_name, occurrence, latency, &failure);
                    self.record_and_send(event).await;
                    out.push((call.clone(), failure.message, true));
                }
            }
        }
        out
    }

    /// Inject the request-level doc retrieval effort when the model didn't
    /// pick one itself.
    fn with_doc_effort(&self, call: &ToolCall) -> Value {
        let mut args = call.arguments.clone();
        if call.tool_name == "doc_search" {
            if let (Some(effort), Some(obj)) = (self.doc_effort, args.as_object_mut()) {
                obj.entry("reasoning_effort")
                    .or_insert_with(|| Value::String(effort.as_str().into()));
            }
        }
        args
    }

    /// Emit a start/success pair for a control-flow tool the orchestrator
    /// handles itself (handoff transfers).
    async fn emit_synthetic_tool(&mut self, call: &ToolCall, summary: &str) {
        let occurrence = self.next_occurrence(&call.tool_name);
        let start =
            ToolEventRecord::start(&call.tool_name, occurrence, args_digest(&call.arguments));
        self.record_and_send(start).await;
        let success =
            ToolEventRecord::success(&call.tool_name, occurrence, 0, summary.to_string());
        self.record_and_send(success).await;
    }

    /// Run a bounded specialist sub-loop for magentic delegation. The
    /// child's text is returned to the manager; its tool events stream to
    /// the client like any other tool activity.
    async fn run_child(&mut self, agent: &AgentDef, task: &str) -> Result<(String, bool)> {
        let mut messages = vec![Message::system(agent.instructions), Message::user(task)];
        let specs = self.specs_for(agent);
        let mut child_text = String::new();

        for _ in 0..MAX_CHILD_ROUNDS {
            let step = self.model_step(&messages, &specs, false).await?;
            if step.cancelled {
                return Ok((child_text, true));
            }
            if let Some(message) = step.upstream_error {
                return Ok((message, true));
            }
            child_text.push_str(&step.text);
            if step.tool_calls.is_empty() {
                return Ok((child_text, false));
            }

            messages.push(assistant_tool_message(&step.text, &step.tool_calls));
            let results = self.execute_tools(&step.tool_calls, &specs).await;
            for (call, content, is_error) in results {
                messages.push(tool_result_message(&call, content, is_error));
            }
        }

        Ok(("specialist reached its tool limit".into(), true))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Finalization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Dedupe citations by source and assign 1-based display indices.
fn finalize_citations(collected: Vec<Citation>) -> Vec<Citation> {
    let mut seen: Vec<(Option<String>, Option<String>)> = Vec::new();
    let mut out = Vec::new();
    for citation in collected {
        let key = (citation.url.clone(), citation.title.clone());
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        let index = out.len() as u32 + 1;
        out.push(Citation { index, ..citation });
    }
    out
}

#[allow(clippy::too_many_arguments)]
async fn finalize(
    state: &AppState,
    input: &TurnInput,
    conversation: &Conversation,
    driver: TurnDriver<'_>,
    outcome: Result<DriveOutcome>,
    tx: &mpsc::Sender<TurnFrame>,
    turn_id: uuid::Uuid,
) {
    let TurnDriver {
        accumulated,
        citations,
        tool_events,
        any_output,
        ..
    } = driver;

    let conv_id = conversation.conversation_id.clone();
    let user_message = StoredMessage::new(&conv_id, MessageRole::User, &input.query);
    let tool_events = (!tool_events.is_empty()).then_some(tool_events);

    let mut to_persist: Vec<StoredMessage> = Vec::new();

    match outcome {
        Ok(DriveOutcome::Final) => {
            if chart::chart_intent(&input.query) {
                match chart::parse_chart_response(&accumulated) {
                    Ok(payload) => {
                        let serialized = payload.to_string();
                        let _ = tx.send(TurnFrame::Chart(payload)).await;
                        let _ = tx.send(TurnFrame::Done).await;
                        let mut assistant =
                            StoredMessage::new(&conv_id, MessageRole::Assistant, serialized);
                        assistant.tool_events = tool_events;
                        to_persist.push(user_message);
                        to_persist.push(assistant);
                    }
                    Err(parse_err) => {
                        tracing::warn!(%turn_id, error = ?parse_err, "chart shaping failed");
                        let message = parse_err.user_message().to_string();
                        let _ = tx
                            .send(TurnFrame::Error {
                                message: message.clone(),
                            })
                            .await;
                        let mut assistant =
                            StoredMessage::new(&conv_id, MessageRole::Error, message);
                        assistant.tool_events = tool_events;
                        to_persist.push(user_message);
                        to_persist.push(assistant);
                    }
                }
            } else {
                let citations = finalize_citations(citations);
                if !citations.is_empty() {
                    let _ = tx
                        .send(TurnFrame::Citations {
                            accumulated: accumulated.clone(),
                            citations: citations.clone(),
                        })
                        .await;
                }
                let _ = tx.send(TurnFrame::Done).await;
                let mut assistant =
                    StoredMessage::new(&conv_id, MessageRole::Assistant, &accumulated);
                assistant.citations = (!citations.is_empty()).then_some(citations);
                assistant.tool_events = tool_events;
                to_persist.push(user_message);
                to_persist.push(assistant);
            }
        }
        Ok(DriveOutcome::Cancelled) => {
            let _ = tx.send(TurnFrame::Done).await;
            if any_output {
                // Persist the partial answer as-is.
                let mut assistant =
                    StoredMessage::new(&conv_id, MessageRole::Assistant, &accumulated);
                assistant.tool_events = tool_events;
                to_persist.push(user_message);
                to_persist.push(assistant);
            }
            // Cancelled before any output: nothing is persisted.
        }
        Ok(DriveOutcome::ToolLimit) => {
            let message = "tool invocation limit exceeded".to_string();
            let _ = tx
                .send(TurnFrame::Error {
                    message: message.clone(),
                })
                .await;
            let mut assistant = StoredMessage::new(&conv_id, MessageRole::Error, message);
            assistant.tool_events = tool_events;
            to_persist.push(user_message);
            to_persist.push(assistant);
        }
        Ok(DriveOutcome::UpstreamError(detail)) => {
            tracing::warn!(%turn_id, error = %detail, "model stream reported an error");
            let _ = tx
                .send(TurnFrame::Error {
                    message: "the model service returned an error, please retry".into(),
                })
                .await;
            // Upstream failure: the assistant message is not persisted.
            to_persist.push(user_message);
        }
        Err(e) => {
            tracing::warn!(%turn_id, error = %e, "turn failed during the model loop");
            let _ = tx
                .send(TurnFrame::Error {
                    message: e.client_message(),
                })
                .await;
            if e.persists_error_message() {
                let mut assistant =
                    StoredMessage::new(&conv_id, MessageRole::Error, e.client_message());
                assistant.tool_events = tool_events;
                to_persist.push(user_message);
                to_persist.push(assistant);
            }
        }
    }

    if to_persist.is_empty() {
        return;
    }

    // History write failures never fail the turn — the user already has
    // the answer.
    let persist = state.history.append_messages(&conv_id, &to_persist);
    match tokio::time::timeout(PERSIST_TIMEOUT, persist).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(%turn_id, conversation_id = %conv_id, error = %e, "history write failed");
        }
        Err(_) => {
            tracing::warn!(%turn_id, conversation_id = %conv_id, "history write timed out");
        }
    }
}

/// Replay persisted history as chat messages (Chat shape only; the
/// Responses shape carries history in the provider thread).
async fn replay_history(state: &AppState, conversation_id: &str) -> Vec<Message> {
    let stored = match state.history.list_messages(conversation_id).await {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!(conversation_id, error = %e, "history replay failed, starting fresh");
            return Vec::new();
        }
    };

    stored
        .into_iter()
        .filter_map(|m| match m.role {
            MessageRole::User => Some(Message::user(m.content)),
            MessageRole::Assistant => Some(Message::assistant(m.content)),
            MessageRole::Error => None,
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_citations_dedupes_and_indexes() {
        let collected = vec![
            Citation {
                index: 0,
                title: Some("A".into()),
                url: Some("https://a".into()),
                snippet: None,
                relevance: None,
            },
            Citation {
                index: 0,
                title: Some("A".into()),
                url: Some("https://a".into()),
                snippet: None,
                relevance: None,
            },
            Citation {
                index: 0,
                title: Some("B".into()),
                url: Some("https://b".into()),
                snippet: None,
                relevance: Some(0.5),
            },
        ];
        let out = finalize_citations(collected);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].index, 1);
        assert_eq!(out[1].index, 2);
        assert_eq!(out[1].title.as_deref(), Some("B"));
    }

    #[test]
    fn cancel_key_prefers_conversation_id() {
        let turn_id = uuid::Uuid::new_v4();
        assert_eq!(
            cancel_key_for(&Some("conv-1".into()), turn_id),
            "conv-1"
        );
        assert_eq!(cancel_key_for(&None, turn_id), turn_id.to_string());
    }
}
