//! Chat-Completions-style client.
//!
//! Works with any endpoint following the chat completions contract. Tool
//! calls arrive as argument deltas keyed by index and are assembled here;
//! conversation threads are client-local (history is replayed per call),
//! so thread teardown releases nothing remotely.

use std::collections::HashMap;

use serde_json::Value;

use fm_domain::error::Result;
use fm_domain::stream::{BoxStream, CompletionEvent, Usage};
use fm_domain::tool::{ContentPart, Message, MessageContent, Role, ToolSpec};

use crate::sse::sse_response_stream;
use crate::traits::{ClientShape, CompletionRequest, LlmClient};
use crate::util::{from_reqwest, from_status};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ChatClient {
    id: String,
    base_url: String,
    api_version: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ChatClient {
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
            id: "chat".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version,
            api_key,
            client,
        })
    }

    fn url(&self) -> String {
        match &self.api_version {
            Some(v) => format!("{}/chat/completions?api-version={v}", self.base_url),
            None => format!("{}/chat/completions", self.base_url),
        }
    }

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_chat).collect();

        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_chat).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_chat(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_chat(msg),
        Role::Assistant => assistant_to_chat(msg),
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content.extract_all_text(),
        }),
    }
}

fn assistant_to_chat(msg: &Message) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text_parts.push(t.clone()),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        }));
                    }
                    ContentPart::ToolResult { .. } => {}
                }
            }
        }
    }

    if text_parts.is_empty() {
        obj["content"] = Value::Null;
    } else {
        obj["content"] = Value::String(text_parts.join("\n"));
    }
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_chat(msg: &Message) -> Value {
    if let MessageContent::Parts(parts) = &msg.content {
        for part in parts {
            if let ContentPart::ToolResult {
                tool_use_id,
                content,
                ..
            } = part
            {
                return serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                });
            }
        }
    }
    serde_json::json!({
        "role": "tool",
        "tool_call_id": "",
        "content": msg.content.extract_all_text(),
    })
}

fn tool_to_chat(tool: &ToolSpec) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Mutable state carried across SSE data payloads.
#[derive(Default)]
struct StreamState {
    /// index → (call_id, tool_name, arguments buffer).
    calls: HashMap<u64, (String, String, String)>,
    /// Cumulative reasoning text when the endpoint streams it.
    reasoning: String,
    usage: Option<Usage>,
}

impl StreamState {
    /// Flush assembled tool calls at end-of-stream, in index order.
    fn flush_calls(&mut self) -> Vec<Result<CompletionEvent>> {
        let mut indices: Vec<u64> = self.calls.keys().copied().collect();
        indices.sort_unstable();

        let mut events = Vec::new();
        for idx in indices {
            let Some((call_id, name, args)) = self.calls.remove(&idx) else {
                continue;
            };
            let arguments = if args.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                match serde_json::from_str(&args) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(
                            call_id = %call_id,
                            tool = %name,
                            error = %e,
                            "tool call arguments are not valid JSON; defaulting to empty object"
                        );
                        Value::Object(Default::default())
                    }
                }
            };
            events.push(Ok(CompletionEvent::ToolCallFinished {
                call_id,
                tool_name: name,
                arguments,
            }));
        }
        events
    }
}

fn parse_chat_data(state: &mut StreamState, data: &str) -> Vec<Result<CompletionEvent>> {
    if data == "[DONE]" {
        let mut events = state.flush_calls();
        events.push(Ok(CompletionEvent::Done {
            usage: state.usage.take(),
            finish_reason: Some("stop".into()),
        }));
        return events;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "skipping unparseable chat completion chunk");
            return Vec::new();
        }
    };

    if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
        state.usage = Some(Usage {
            prompt_tokens: usage
                .get("prompt_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            completion_tokens: usage
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            total_tokens: usage
                .get("total_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
        });
    }

    let mut events = Vec::new();

    let choices = value.get("choices").and_then(|c| c.as_array());
    let Some(choices) = choices else {
        return events;
    };

    for choice in choices {
        let Some(delta) = choice.get("delta") else {
            continue;
        };

        if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
            if !text.is_empty() {
                events.push(Ok(CompletionEvent::TextDelta { text: text.into() }));
            }
        }

        if let Some(thought) = delta.get("reasoning_content").and_then(|c| c.as_str()) {
            if !thought.is_empty() {
                state.reasoning.push_str(thought);
                events.push(Ok(CompletionEvent::Reasoning {
                    text: state.reasoning.clone(),
                }));
            }
        }

        if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
            for tc in tool_calls {
                let index = tc.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let entry = state.calls.entry(index).or_insert_with(|| {
                    (String::new(), String::new(), String::new())
                });

                if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                    entry.0 = id.to_string();
                }
                if let Some(function) = tc.get("function") {
                    if let Some(name) = function.get("name").and_then(|v| v.as_str()) {
                        if entry.1.is_empty() {
                            entry.1 = name.to_string();
                            events.push(Ok(CompletionEvent::ToolCallStarted {
                                call_id: entry.0.clone(),
                                tool_name: entry.1.clone(),
                            }));
                        }
                    }
                    if let Some(args) = function.get("arguments").and_then(|v| v.as_str()) {
                        entry.2.push_str(args);
                        events.push(Ok(CompletionEvent::ToolCallDelta {
                            call_id: entry.0.clone(),
                            delta: args.to_string(),
                        }));
                    }
                }
            }
        }
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LlmClient impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmClient for ChatClient {
    async fn stream(
        &self,
        req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<CompletionEvent>>> {
        let body = self.build_body(&req);
        let mut builder = self
            .client
            .post(self.url())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        let response = builder.json(&body).send().await.map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(from_status(status, &text));
        }

        let mut state = StreamState::default();
        Ok(sse_response_stream(response, move |data| {
            parse_chat_data(&mut state, data)
        }))
    }

    async fn create_thread(&self) -> Result<String> {
        // Chat threads are client-local; history is replayed per call.
        Ok(format!("local-{}", uuid::Uuid::new_v4()))
    }

    async fn delete_thread(&self, _thread_id: &str) -> Result<()> {
        Ok(())
    }

    fn shape(&self) -> ClientShape {
        ClientShape::Chat
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
        parse_chat_data(state, data)
            .into_iter()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn content_delta_parsed() {
        let mut state = StreamState::default();
        let events = parse(
            &mut state,
            r#"{"choices":[{"delta":{"content":"hello"}}]}"#,
        );
        assert!(matches!(
            &events[0],
            CompletionEvent::TextDelta { text } if text == "hello"
        ));
    }

    #[test]
    fn tool_call_assembled_across_chunks() {
        let mut state = StreamState::default();
        parse(
            &mut state,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9","function":{"name":"web_search","arguments":"{\"qu"}}]}}]}"#,
        );
        parse(
            &mut state,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ery\":\"bikes\"}"}}]}}]}"#,
        );
        let events = parse(&mut state, "[DONE]");
        let finished = events
            .iter()
            .find_map(|e| match e {
                CompletionEvent::ToolCallFinished {
                    call_id,
                    tool_name,
                    arguments,
                } => Some((call_id.clone(), tool_name.clone(), arguments.clone())),
                _ => None,
            })
            .expect("tool call should flush at [DONE]");
        assert_eq!(finished.0, "call_9");
        assert_eq!(finished.1, "web_search");
        assert_eq!(finished.2["query"], "bikes");
    }

    #[test]
    fn parallel_tool_calls_flush_in_index_order() {
        let mut state = StreamState::default();
        parse(
            &mut state,
            r#"{"choices":[{"delta":{"tool_calls":[
                {"index":1,"id":"call_b","function":{"name":"web_search","arguments":"{}"}},
                {"index":0,"id":"call_a","function":{"name":"sql_query","arguments":"{}"}}
            ]}}]}"#,
        );
        let events = parse(&mut state, "[DONE]");
        let names: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                CompletionEvent::ToolCallFinished { tool_name, .. } => Some(tool_name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["sql_query", "web_search"]);
    }

    #[test]
    fn usage_carried_into_done() {
        let mut state = StreamState::default();
        parse(
            &mut state,
            r#"{"choices":[],"usage":{"prompt_tokens":7,"completion_tokens":3,"total_tokens":10}}"#,
        );
        let events = parse(&mut state, "[DONE]");
        match events.last().unwrap() {
            CompletionEvent::Done { usage: Some(u), .. } => assert_eq!(u.total_tokens, 10),
            other => panic!("expected Done with usage, got {other:?}"),
        }
    }

    #[test]
    fn reasoning_content_accumulates() {
        let mut state = StreamState::default();
        parse(
            &mut state,
            r#"{"choices":[{"delta":{"reasoning_content":"step one. "}}]}"#,
        );
        let events = parse(
            &mut state,
            r#"{"choices":[{"delta":{"reasoning_content":"step two."}}]}"#,
        );
        match &events[0] {
            CompletionEvent::Reasoning { text } => assert_eq!(text, "step one. step two."),
            other => panic!("expected Reasoning, got {other:?}"),
        }
    }

    #[test]
    fn assistant_tool_use_serializes_to_chat_format() {
        let msg = Message {
            role: Role::Assistant,
            content: MessageContent::Parts(vec![ContentPart::ToolUse {
                id: "call_1".into(),
                name: "sql_query".into(),
                input: serde_json::json!({"query": "SELECT 1"}),
            }]),
        };
        let value = msg_to_chat(&msg);
        assert_eq!(value["tool_calls"][0]["function"]["name"], "sql_query");
        assert!(value["content"].is_null());
    }

    #[test]
    fn tool_result_serializes_with_call_id() {
        let msg = Message::tool_result("call_1", "3 rows");
        let value = msg_to_chat(&msg);
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
        assert_eq!(value["content"], "3 rows");
    }
}
