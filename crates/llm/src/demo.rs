//! Deterministic demo client.
//!
//! When demo mode is enabled this replaces both real client shapes: it
//! emits a fixed event script chosen by keyword match over the user text,
//! so presentations work with no upstreams at all. History persistence and
//! the tool loop still run end-to-end.

use serde_json::Value;

use fm_domain::error::Result;
use fm_domain::stream::{BoxStream, CompletionEvent};
use fm_domain::tool::{Message, Role, ToolSpec};

use crate::traits::{ClientShape, CompletionRequest, LlmClient};

pub struct DemoClient {
    shape: ClientShape,
}

impl DemoClient {
    pub fn new(shape: ClientShape) -> Self {
        Self { shape }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Script selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn last_user_text(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.extract_all_text())
        .unwrap_or_default()
}

fn has_tool_result(messages: &[Message]) -> bool {
    messages.iter().any(|m| m.role == Role::Tool)
}

fn tool_named<'a>(tools: &'a [ToolSpec], name: &str) -> Option<&'a ToolSpec> {
    tools.iter().find(|t| t.name == name)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// The canned line-chart answer: twelve months of sales.
fn chart_answer() -> String {
    serde_json::json!({
        "chartType": "line",
        "data": {
            "labels": ["Jan", "Feb", "Mar", "Apr", "May", "Jun",
                       "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"],
            "datasets": [{
                "label": "Monthly sales",
                "values": [118.0, 104.5, 131.2, 127.8, 143.0, 158.6,
                           149.9, 162.3, 171.0, 166.4, 180.2, 195.7]
            }]
        }
    })
    .to_string()
}

fn tool_call(name: &str, arguments: Value) -> Vec<CompletionEvent> {
    vec![
        CompletionEvent::ToolCallStarted {
            call_id: format!("demo-{name}"),
            tool_name: name.into(),
        },
        CompletionEvent::ToolCallFinished {
            call_id: format!("demo-{name}"),
            tool_name: name.into(),
            arguments,
        },
    ]
}

fn text_answer(reasoning: &str, chunks: &[&str]) -> Vec<CompletionEvent> {
    let mut events = vec![CompletionEvent::Reasoning {
        text: reasoning.into(),
    }];
    events.extend(chunks.iter().map(|c| CompletionEvent::TextDelta {
        text: (*c).to_string(),
    }));
    events
}

/// Build the event script for one completion call.
fn build_script(req: &CompletionRequest) -> Vec<CompletionEvent> {
    let query = last_user_text(&req.messages).to_lowercase();
    let follow_up = has_tool_result(&req.messages);

    let mut events = if follow_up {
        // A tool already ran; produce the final answer for the dominant
        // script so the loop terminates.
        if contains_any(&query, &["spec", "document", "仕様", "マニュアル"]) {
            text_answer(
                "The retrieval summary covers the product specification.",
                &[
                    "According to the product documentation, the Mountain-200 ",
                    "ships with a 38-tooth chainring and hydraulic disc brakes.",
                ],
            )
        } else if contains_any(&query, &["news", "latest", "web"]) {
            text_answer(
                "The search results mention a recent product launch.",
                &["Recent coverage highlights strong demand for touring bikes."],
            )
        } else {
            text_answer(
                "The query results list the three best sellers.",
                &[
                    "The top 3 products this month are ",
                    "Mountain-200, Road-250 and Touring-1000.",
                ],
            )
        }
    } else if contains_any(
        &query,
        &[
            "chart", "graph", "visualize", "plot", "グラフ", "チャート", "可視化", "折れ線",
        ],
    ) {
        let chart = chart_answer();
        text_answer("A chart was requested; emitting the payload.", &[chart.as_str()])
    } else if let Some(transfer) = req
        .tools
        .iter()
        .find(|t| t.name.starts_with("transfer_to_"))
        .map(|_| {
            if contains_any(&query, &["spec", "document", "仕様"]) {
                "transfer_to_doc_agent"
            } else if contains_any(&query, &["news", "latest", "web"]) {
                "transfer_to_web_agent"
            } else {
                "transfer_to_sql_agent"
            }
        })
        .and_then(|name| tool_named(&req.tools, name))
    {
        tool_call(&transfer.name, serde_json::json!({}))
    } else if let Some(delegate) = tool_named(&req.tools, "ask_sql_specialist") {
        tool_call(
            &delegate.name,
            serde_json::json!({"task": "top products this month"}),
        )
    } else if contains_any(&query, &["spec", "document", "仕様", "マニュアル"]) {
        match tool_named(&req.tools, "doc_search") {
            Some(_) => tool_call("doc_search", serde_json::json!({"query": query})),
            None => text_answer(
                "No retrieval tool is available; answering directly.",
                &["The product documentation is not reachable right now."],
            ),
        }
    } else if contains_any(&query, &["news", "latest", "web"]) {
        match tool_named(&req.tools, "web_search") {
            Some(_) => tool_call("web_search", serde_json::json!({"query": query})),
            None => text_answer(
                "No web tool is available; answering directly.",
                &["Web grounding is not reachable right now."],
            ),
        }
    } else if let Some(_sql) = tool_named(&req.tools, "sql_query") {
        tool_call(
            "sql_query",
            serde_json::json!({
                "query": "SELECT product, SUM(amount) FROM sales GROUP BY product ORDER BY 2 DESC LIMIT 3"
            }),
        )
    } else {
        text_answer(
            "No tools apply; answering directly.",
            &["This is a demo response. Ask about sales, specs, or charts."],
        )
    };

    events.push(CompletionEvent::Done {
        usage: None,
        finish_reason: Some("stop".into()),
    });
    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LlmClient impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmClient for DemoClient {
    async fn stream(
        &self,
        req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<CompletionEvent>>> {
        let script = build_script(&req);
        let stream = async_stream::stream! {
            for event in script {
                yield Ok(event);
            }
        };
        Ok(Box::pin(stream))
    }

    async fn create_thread(&self) -> Result<String> {
        Ok(format!("demo-{}", uuid::Uuid::new_v4()))
    }

    async fn delete_thread(&self, _thread_id: &str) -> Result<()> {
        Ok(())
    }

    fn shape(&self) -> ClientShape {
        self.shape
    }

    fn client_id(&self) -> &str {
        "demo"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_spec() -> ToolSpec {
        ToolSpec {
            name: "sql_query".into(),
            description: "Run SQL".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn sales_query_calls_sql_tool() {
        let req = CompletionRequest {
            messages: vec![Message::user("Top 3 products this month")],
            tools: vec![sql_spec()],
            ..Default::default()
        };
        let script = build_script(&req);
        assert!(script.iter().any(|e| matches!(
            e,
            CompletionEvent::ToolCallFinished { tool_name, .. } if tool_name == "sql_query"
        )));
    }

    #[test]
    fn follow_up_after_tool_result_produces_final_text() {
        let req = CompletionRequest {
            messages: vec![
                Message::user("Top 3 products this month"),
                Message::tool_result("demo-sql_query", "3 rows"),
            ],
            tools: vec![sql_spec()],
            ..Default::default()
        };
        let script = build_script(&req);
        let text: String = script
            .iter()
            .filter_map(|e| match e {
                CompletionEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(text.contains("Mountain-200"));
        assert!(text.contains("Road-250"));
        assert!(text.contains("Touring-1000"));
    }

    #[test]
    fn chart_query_emits_chart_json() {
        let req = CompletionRequest {
            messages: vec![Message::user("月別売上を折れ線グラフで")],
            tools: vec![sql_spec()],
            ..Default::default()
        };
        let script = build_script(&req);
        let text: String = script
            .iter()
            .filter_map(|e| match e {
                CompletionEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["chartType"], "line");
        assert_eq!(value["data"]["labels"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn transfer_tool_preferred_when_present() {
        let transfer = ToolSpec {
            name: "transfer_to_sql_agent".into(),
            description: "Hand off".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        };
        let req = CompletionRequest {
            messages: vec![Message::user("show sales for Mountain-200")],
            tools: vec![transfer, sql_spec()],
            ..Default::default()
        };
        let script = build_script(&req);
        assert!(script.iter().any(|e| matches!(
            e,
            CompletionEvent::ToolCallFinished { tool_name, .. }
                if tool_name == "transfer_to_sql_agent"
        )));
    }

    #[test]
    fn script_always_terminates_with_done() {
        let req = CompletionRequest {
            messages: vec![Message::user("hello")],
            ..Default::default()
        };
        let script = build_script(&req);
        assert!(matches!(
            script.last().unwrap(),
            CompletionEvent::Done { .. }
        ));
    }
}
