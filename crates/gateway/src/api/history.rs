//! History endpoints consumed by the front-end.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use fm_domain::error::Error;
use fm_history::{MessageRole, StoredMessage};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "d_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn d_limit() -> i64 {
    25
}

fn error_response(e: Error) -> Response {
    let status = match &e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(error = %e, "history endpoint failed");
    (
        status,
        Json(serde_json::json!({ "success": false, "error": e.client_message() })),
    )
        .into_response()
}

// ── GET /v1/history/list ───────────────────────────────────────────

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<Pagination>,
) -> Response {
    let user_id = super::caller_id(&headers);
    match state
        .history
        .list_conversations(&user_id, page.limit, page.offset)
        .await
    {
        Ok(conversations) => {
            Json(serde_json::json!({ "success": true, "data": conversations })).into_response()
        }
        Err(e) => error_response(e),
    }
}

// ── GET /v1/history/read/:conversation_id ──────────────────────────

pub async fn read(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Response {
    match state.history.list_messages(&conversation_id).await {
        Ok(messages) => Json(serde_json::json!({
            "success": true,
            "data": { "conversation_id": conversation_id, "messages": messages }
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

// ── POST /v1/history/update ────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Append messages; on first append for a new conversation the response
/// carries the freshly assigned id and generated title.
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateRequest>,
) -> Response {
    let user_id = super::caller_id(&headers);
    if body.messages.is_empty() {
        return error_response(Error::Validation("messages must not be empty".into()));
    }

    let first_text = body
        .messages
        .iter()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.content.as_str())
        .unwrap_or_else(|| body.messages[0].content.as_str());

    let conversation = match state
        .history
        .ensure_conversation(&user_id, body.conversation_id.as_deref(), first_text)
        .await
    {
        Ok(c) => c,
        Err(e) => return error_response(e),
    };

    let stored: Vec<StoredMessage> = body
        .messages
        .iter()
        .map(|m| StoredMessage::new(&conversation.conversation_id, m.role, &m.content))
        .collect();

    if let Err(e) = state
        .history
        .append_messages(&conversation.conversation_id, &stored)
        .await
    {
        return error_response(e);
    }

    Json(serde_json::json!({
        "success": true,
        "data": {
            "conversation_id": conversation.conversation_id,
            "title": conversation.title,
            "date": conversation.updated_at,
        }
    }))
    .into_response()
}

// ── DELETE /v1/history/delete/:conversation_id ─────────────────────

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Response {
    // Drop the live provider thread along with the stored rows.
    state.threads.remove(&conversation_id);
    match state.history.delete_conversation(&conversation_id).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => error_response(e),
    }
}

// ── DELETE /v1/history/delete_all ──────────────────────────────────

pub async fn delete_all(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = super::caller_id(&headers);
    match state.history.delete_all(&user_id).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => error_response(e),
    }
}
