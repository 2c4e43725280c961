//! Responses-style client.
//!
//! Speaks a Responses API: tool invocations arrive as server-driven output
//! items, reasoning is surfaced as summary-text deltas, and the server
//! keeps a conversation object per thread which we reference by id instead
//! of replaying history on every call.

use std::collections::HashMap;

use serde_json::Value;

use fm_domain::error::{Error, Result};
use fm_domain::stream::{BoxStream, CompletionEvent, Usage};
use fm_domain::tool::{Citation, ContentPart, Message, MessageContent, Role, ToolSpec};

use crate::sse::sse_response_stream;
use crate::traits::{ClientShape, CompletionRequest, LlmClient};
use crate::util::{from_reqwest, from_status};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ResponsesClient {
    id: String,
    base_url: String,
    api_version: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ResponsesClient {
    pub fn new(
        base_url: impl Into<String>,
        api_version: Option<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "responses".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version,
            api_key,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        match &self.api_version {
            Some(v) => format!("{}{path}?api-version={v}", self.base_url),
            None => format!("{}{path}", self.base_url),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let input: Vec<Value> = req.messages.iter().flat_map(msg_to_items).collect();

        let mut body = serde_json::json!({
            "model": req.model,
            "input": input,
            "stream": true,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_responses).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        let mut reasoning = serde_json::Map::new();
        if let Some(effort) = req.reasoning.effort {
            reasoning.insert("effort".into(), Value::String(effort.as_str().into()));
        }
        if let Some(summary) = req.reasoning.summary {
            if summary != fm_domain::turn::ReasoningSummary::Off {
                reasoning.insert("summary".into(), Value::String(summary.as_str().into()));
            }
        }
        if !reasoning.is_empty() {
            body["reasoning"] = Value::Object(reasoning);
        }
        if let Some(thread) = &req.thread_id {
            body["conversation"] = Value::String(thread.clone());
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_items(msg: &Message) -> Vec<Value> {
    match msg.role {
        Role::Tool => tool_result_items(msg),
        Role::Assistant => assistant_items(msg),
        Role::System => vec![serde_json::json!({
            "role": "system",
            "content": [{"type": "input_text", "text": msg.content.extract_all_text()}],
        })],
        Role::User => vec![serde_json::json!({
            "role": "user",
            "content": [{"type": "input_text", "text": msg.content.extract_all_text()}],
        })],
    }
}

fn assistant_items(msg: &Message) -> Vec<Value> {
    let mut items = Vec::new();
    match &msg.content {
        MessageContent::Text(t) => items.push(serde_json::json!({
            "role": "assistant",
            "content": [{"type": "output_text", "text": t}],
        })),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => items.push(serde_json::json!({
                        "role": "assistant",
                        "content": [{"type": "output_text", "text": text}],
                    })),
                    ContentPart::ToolUse { id, name, input } => {
                        items.push(serde_json::json!({
                            "type": "function_call",
                            "call_id": id,
                            "name": name,
                            "arguments": input.to_string(),
                        }));
                    }
                    ContentPart::ToolResult { .. } => {}
                }
            }
        }
    }
    items
}

fn tool_result_items(msg: &Message) -> Vec<Value> {
    let mut items = Vec::new();
    if let MessageContent::Parts(parts) = &msg.content {
        for part in parts {
            if let ContentPart::ToolResult {
                tool_use_id,
                content,
                ..
            } = part
            {
                items.push(serde_json::json!({
                    "type": "function_call_output",
                    "call_id": tool_use_id,
                    "output": content,
                }));
            }
        }
    }
    items
}

fn tool_to_responses(tool: &ToolSpec) -> Value {
    serde_json::json!({
        "type": "function",
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Mutable state carried across SSE data payloads.
#[derive(Default)]
struct StreamState {
    /// Reasoning summary text accumulated so far. The upstream emits
    /// deltas, but the internal event carries the full cumulative string so
    /// downstream consumers replace instead of appending.
    reasoning: String,
    /// item_id → (call_id, tool_name) for in-flight function calls.
    calls: HashMap<String, (String, String)>,
}

fn parse_responses_data(state: &mut StreamState, data: &str) -> Vec<Result<CompletionEvent>> {
    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "skipping unparseable responses event");
            return Vec::new();
        }
    };

    let event_type = value.get("type").and_then(|t| t.as_str()).unwrap_or("");

    match event_type {
        "response.output_text.delta" => {
            let text = value
                .get("delta")
                .and_then(|d| d.as_str())
                .unwrap_or("")
                .to_string();
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Ok(CompletionEvent::TextDelta { text })]
            }
        }
        "response.reasoning_summary_text.delta" => {
            let delta = value.get("delta").and_then(|d| d.as_str()).unwrap_or("");
            state.reasoning.push_str(delta);
            vec![Ok(CompletionEvent::Reasoning {
                text: state.reasoning.clone(),
            })]
        }
        "response.output_item.added" => {
            let item = value.get("item").cloned().unwrap_or(Value::Null);
            if item.get("type").and_then(|t| t.as_str()) == Some("function_call") {
                let item_id = json_str(&item, "id");
                let call_id = json_str(&item, "call_id");
                let name = json_str(&item, "name");
                state
                    .calls
                    .insert(item_id, (call_id.clone(), name.clone()));
                vec![Ok(CompletionEvent::ToolCallStarted {
                    call_id,
                    tool_name: name,
                })]
            } else {
                Vec::new()
            }
        }
        "response.function_call_arguments.delta" => {
            let item_id = json_str(&value, "item_id");
            let delta = json_str(&value, "delta");
            match state.calls.get(&item_id) {
                Some((call_id, _)) => vec![Ok(CompletionEvent::ToolCallDelta {
                    call_id: call_id.clone(),
                    delta,
                })],
                None => Vec::new(),
            }
        }
        "response.output_item.done" => {
            let item = value.get("item").cloned().unwrap_or(Value::Null);
            if item.get("type").and_then(|t| t.as_str()) != Some("function_call") {
                return Vec::new();
            }
            let item_id = json_str(&item, "id");
            state.calls.remove(&item_id);
            let call_id = json_str(&item, "call_id");
            let name = json_str(&item, "name");
            let args_raw = json_str(&item, "arguments");
            let arguments = if args_raw.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&args_raw).unwrap_or_else(|e| {
                    tracing::warn!(
                        call_id = %call_id,
                        tool = %name,
                        error = %e,
                        "function call arguments are not valid JSON; defaulting to empty object"
                    );
                    Value::Object(Default::default())
                })
            };
            vec![Ok(CompletionEvent::ToolCallFinished {
                call_id,
                tool_name: name,
                arguments,
            })]
        }
        "response.output_text.annotation.added" => {
            let ann = value.get("annotation").cloned().unwrap_or(Value::Null);
            vec![Ok(CompletionEvent::CitationAdded {
                citation: Citation {
                    index: 0,
                    title: ann.get("title").and_then(|v| v.as_str()).map(String::from),
                    url: ann.get("url").and_then(|v| v.as_str()).map(String::from),
                    snippet: ann
                        .get("snippet")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    relevance: None,
                },
            })]
        }
        "response.completed" => {
            let usage = value
                .get("response")
                .and_then(|r| r.get("usage"))
                .map(|u| Usage {
                    prompt_tokens: u
                        .get("input_tokens")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0) as u32,
                    completion_tokens: u
                        .get("output_tokens")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0) as u32,
                    total_tokens: u
                        .get("total_tokens")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0) as u32,
                });
            vec![Ok(CompletionEvent::Done {
                usage,
                finish_reason: Some("stop".into()),
            })]
        }
        "response.failed" => {
            let message = value
                .get("response")
                .and_then(|r| r.get("error"))
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("response failed")
                .to_string();
            vec![Ok(CompletionEvent::Error { message })]
        }
        "error" => {
            let message = json_str(&value, "message");
            vec![Ok(CompletionEvent::Error { message })]
        }
        _ => Vec::new(),
    }
}

fn json_str(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LlmClient impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmClient for ResponsesClient {
    async fn stream(
        &self,
        req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<CompletionEvent>>> {
        let body = self.build_body(&req);
        let response = self
            .authed(self.client.post(self.url("/responses")))
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(from_status(status, &text));
        }

        let mut state = StreamState::default();
        Ok(sse_response_stream(response, move |data| {
            parse_responses_data(&mut state, data)
        }))
    }

    async fn create_thread(&self) -> Result<String> {
        let response = self
            .authed(self.client.post(self.url("/conversations")))
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(from_status(status, &text));
        }

        let value: Value = response.json().await.map_err(from_reqwest)?;
        value
            .get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| Error::Http("conversation create response missing id".into()))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let url = self.url(&format!("/conversations/{thread_id}"));
        let response = self
            .authed(self.client.delete(url))
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(from_status(status, &text));
        }
        Ok(())
    }

    fn shape(&self) -> ClientShape {
        ClientShape::Responses
    }

    fn client_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(state: &mut StreamState, data: &str) -> Vec<CompletionEvent> {
        parse_responses_data(state, data)
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn text_delta_parsed() {
        let mut state = StreamState::default();
        let events = parse(
            &mut state,
            r#"{"type":"response.output_text.delta","delta":"Mountain-200"}"#,
        );
        assert!(matches!(
            &events[0],
            CompletionEvent::TextDelta { text } if text == "Mountain-200"
        ));
    }

    #[test]
    fn reasoning_accumulates_cumulatively() {
        let mut state = StreamState::default();
        parse(
            &mut state,
            r#"{"type":"response.reasoning_summary_text.delta","delta":"First I"}"#,
        );
        let events = parse(
            &mut state,
            r#"{"type":"response.reasoning_summary_text.delta","delta":" will query sales."}"#,
        );
        match &events[0] {
            CompletionEvent::Reasoning { text } => {
                assert_eq!(text, "First I will query sales.");
            }
            other => panic!("expected Reasoning, got {other:?}"),
        }
    }

    #[test]
    fn function_call_lifecycle() {
        let mut state = StreamState::default();
        let started = parse(
            &mut state,
            r#"{"type":"response.output_item.added","item":{"type":"function_call","id":"item_1","call_id":"call_1","name":"sql_query"}}"#,
        );
        assert!(matches!(
            &started[0],
            CompletionEvent::ToolCallStarted { tool_name, .. } if tool_name == "sql_query"
        ));

        let delta = parse(
            &mut state,
            r#"{"type":"response.function_call_arguments.delta","item_id":"item_1","delta":"{\"query\":"}"#,
        );
        assert!(matches!(&delta[0], CompletionEvent::ToolCallDelta { .. }));

        let done = parse(
            &mut state,
            r#"{"type":"response.output_item.done","item":{"type":"function_call","id":"item_1","call_id":"call_1","name":"sql_query","arguments":"{\"query\":\"SELECT 1\"}"}}"#,
        );
        match &done[0] {
            CompletionEvent::ToolCallFinished { arguments, .. } => {
                assert_eq!(arguments["query"], "SELECT 1");
            }
            other => panic!("expected ToolCallFinished, got {other:?}"),
        }
    }

    #[test]
    fn malformed_arguments_default_to_empty_object() {
        let mut state = StreamState::default();
        let done = parse(
            &mut state,
            r#"{"type":"response.output_item.done","item":{"type":"function_call","id":"i","call_id":"c","name":"sql_query","arguments":"{not json"}}"#,
        );
        match &done[0] {
            CompletionEvent::ToolCallFinished { arguments, .. } => {
                assert!(arguments.as_object().unwrap().is_empty());
            }
            other => panic!("expected ToolCallFinished, got {other:?}"),
        }
    }

    #[test]
    fn completed_carries_usage() {
        let mut state = StreamState::default();
        let events = parse(
            &mut state,
            r#"{"type":"response.completed","response":{"usage":{"input_tokens":10,"output_tokens":5,"total_tokens":15}}}"#,
        );
        match &events[0] {
            CompletionEvent::Done { usage: Some(u), .. } => {
                assert_eq!(u.total_tokens, 15);
            }
            other => panic!("expected Done with usage, got {other:?}"),
        }
    }

    #[test]
    fn annotation_becomes_citation() {
        let mut state = StreamState::default();
        let events = parse(
            &mut state,
            r#"{"type":"response.output_text.annotation.added","annotation":{"title":"Q3 report","url":"https://example.com/q3"}}"#,
        );
        match &events[0] {
            CompletionEvent::CitationAdded { citation } => {
                assert_eq!(citation.title.as_deref(), Some("Q3 report"));
                assert_eq!(citation.url.as_deref(), Some("https://example.com/q3"));
            }
            other => panic!("expected CitationAdded, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_are_skipped() {
        let mut state = StreamState::default();
        let events = parse(&mut state, r#"{"type":"response.in_progress"}"#);
        assert!(events.is_empty());
    }

    #[test]
    fn body_carries_thread_and_reasoning() {
        let client =
            ResponsesClient::new("https://llm.example.com", Some("2025-04-01".into()), None)
                .unwrap();
        let req = CompletionRequest {
            model: "gpt-primary".into(),
            messages: vec![Message::user("hi")],
            thread_id: Some("conv_abc".into()),
            reasoning: crate::traits::ReasoningControls {
                effort: Some(fm_domain::turn::ModelEffort::High),
                summary: Some(fm_domain::turn::ReasoningSummary::Concise),
            },
            ..Default::default()
        };
        let body = client.build_body(&req);
        assert_eq!(body["conversation"], "conv_abc");
        assert_eq!(body["reasoning"]["effort"], "high");
        assert_eq!(body["reasoning"]["summary"], "concise");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn reasoning_summary_off_is_omitted() {
        let client = ResponsesClient::new("https://llm.example.com", None, None).unwrap();
        let req = CompletionRequest {
            model: "gpt-primary".into(),
            messages: vec![Message::user("hi")],
            reasoning: crate::traits::ReasoningControls {
                effort: None,
                summary: Some(fm_domain::turn::ReasoningSummary::Off),
            },
            ..Default::default()
        };
        let body = client.build_body(&req);
        assert!(body.get("reasoning").is_none());
    }

    #[test]
    fn url_appends_api_version() {
        let client =
            ResponsesClient::new("https://llm.example.com/", Some("2025-04-01".into()), None)
                .unwrap();
        assert_eq!(
            client.url("/responses"),
            "https://llm.example.com/responses?api-version=2025-04-01"
        );
    }
}
