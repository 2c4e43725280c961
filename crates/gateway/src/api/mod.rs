//! HTTP surface — a thin axum layer over the runtime.
//!
//! Authentication and CORS policy are enforced by the outer gateway in
//! front of this process; the caller identity arrives as an opaque
//! `x-user-id` header.

pub mod history;
pub mod turn;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/turn", post(turn::turn))
        .route("/v1/turn/:key/cancel", post(turn::cancel))
        .route("/v1/history/list", get(history::list))
        .route("/v1/history/read/:conversation_id", get(history::read))
        .route("/v1/history/update", post(history::update))
        .route(
            "/v1/history/delete/:conversation_id",
            delete(history::delete_conversation),
        )
        .route("/v1/history/delete_all", delete(history::delete_all))
        .layer(TraceLayer::new_for_http())
        // Real CORS policy lives at the outer gateway; permissive here
        // keeps direct dev access working.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Caller identity from the upstream gateway. Absent in dev setups.
pub(crate) fn caller_id(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(String::from)
        .unwrap_or_else(|| "anonymous".into())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "demo_mode": state.config.runtime.demo_mode,
        "history_enabled": state.config.history.enabled,
        "tools": state.catalog.names(),
        "live_threads": state.threads.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn caller_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("user-42"));
        assert_eq!(caller_id(&headers), "user-42");
    }

    #[test]
    fn caller_id_defaults_to_anonymous() {
        assert_eq!(caller_id(&HeaderMap::new()), "anonymous");
    }

    #[test]
    fn caller_id_ignores_blank_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("  "));
        assert_eq!(caller_id(&headers), "anonymous");
    }
}
