//! The turn endpoint — `POST /v1/turn` returns the newline-framed stream
//! described by the wire protocol, plus `POST /v1/turn/:key/cancel`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use tokio::sync::OwnedSemaphorePermit;

use fm_domain::turn::TurnRequest;
use fm_history::validate_id;
use fm_llm::ReasoningControls;

use crate::runtime::cancel::CancelMap;
use crate::runtime::encoder;
use crate::runtime::turn::{cancel_key_for, run_turn, TurnFrame, TurnInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Parse by hand so every failure is a single protocol error unit
    // rather than a framework rejection body.
    let request: TurnRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return error_stream(format!("invalid request: {e}")),
    };
    if let Err(e) = request.validate() {
        return error_stream(e);
    }

    let user_id = super::caller_id(&headers);
    if let Err(e) = validate_id("user_id", &user_id) {
        return error_stream(e);
    }

    let conversation_id = (!request.id.trim().is_empty()).then(|| request.id.clone());
    if let Some(id) = &conversation_id {
        if let Err(e) = validate_id("conversation_id", id) {
            return error_stream(e);
        }
    }

    // One turn per conversation at a time. New conversations have no id
    // yet, so nothing to contend on.
    let permit = match &conversation_id {
        Some(id) => match state.turn_locks.try_acquire(id) {
            Ok(p) => Some(p),
            Err(busy) => return error_stream(busy.to_string()),
        },
        None => None,
    };

    let mode = request.agent_mode.unwrap_or(state.config.runtime.default_mode);
    let input = TurnInput {
        user_id,
        conversation_id: conversation_id.clone(),
        query: request.query,
        mode,
        model: request.model.unwrap_or_default(),
        temperature: request.temperature,
        doc_effort: request.reasoning_effort,
        reasoning: ReasoningControls {
            effort: request.model_reasoning_effort,
            summary: request.reasoning_summary,
        },
    };

    let keepalive = Duration::from_secs(state.config.server.keepalive_interval_secs.max(1));
    let cancel_map = state.cancel_map.clone();
    let (turn_id, rx) = run_turn(state, input);
    let cancel_key = cancel_key_for(&conversation_id, turn_id);

    stream_response(rx, keepalive, cancel_map, cancel_key, permit)
}

/// Cancels the turn when the client disconnects before the terminal frame.
struct DisconnectGuard {
    cancel_map: Arc<CancelMap>,
    key: String,
    finished: bool,
    /// Held for the stream's lifetime; releases the turn lock on drop.
    _permit: Option<OwnedSemaphorePermit>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished && self.cancel_map.cancel(&self.key) {
            tracing::info!(key = %self.key, "client disconnected, turn cancelled");
        }
    }
}

fn stream_response(
    mut rx: tokio::sync::mpsc::Receiver<TurnFrame>,
    keepalive: Duration,
    cancel_map: Arc<CancelMap>,
    cancel_key: String,
    permit: Option<OwnedSemaphorePermit>,
) -> Response {
    let stream = async_stream::stream! {
        let mut guard = DisconnectGuard {
            cancel_map,
            key: cancel_key,
            finished: false,
            _permit: permit,
        };

        loop {
            // The keepalive timer restarts after every frame, so the
            // marker only appears in genuinely idle gaps.
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(frame) => {
                            let terminal = matches!(
                                frame,
                                TurnFrame::Done | TurnFrame::Error { .. }
                            );
                            if let Some(unit) = encoder::encode(&frame) {
                                yield Ok::<_, std::convert::Infallible>(Bytes::from(unit));
                            }
                            if terminal {
                                guard.finished = true;
                                break;
                            }
                        }
                        None => {
                            guard.finished = true;
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(keepalive) => {
                    yield Ok(Bytes::from(encoder::keepalive_unit()));
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// A single-unit error stream per the wire protocol.
fn error_stream(message: String) -> Response {
    let unit = encoder::encode(&TurnFrame::Error { message })
        .unwrap_or_else(|| "{\"error\":\"internal\"}\n".into());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson; charset=utf-8")
        .body(Body::from(unit))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/turn/:key/cancel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn cancel(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<serde_json::Value> {
    let found = state.cancel_map.cancel(&key);
    if found {
        tracing::info!(key = %key, "turn cancellation requested");
    }
    Json(serde_json::json!({ "success": found }))
}
