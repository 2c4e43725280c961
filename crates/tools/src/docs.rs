//! Agentic document retrieval adapter.
//!
//! Delegates to an external retrieval endpoint that plans its own searches.
//! The reasoning effort travels with the request: `minimal` must not invoke
//! an LLM on the retrieval side, `medium` permits multi-pass iteration, so
//! the timeout scales with the effort.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use fm_domain::cancel::CancelToken;
use fm_domain::tool::{Citation, ToolFailure, ToolOutput, ToolSpec};
use fm_domain::turn::DocEffort;

use crate::ToolAdapter;

pub struct DocSearchTool {
    endpoint: String,
    knowledge_base: String,
    default_effort: DocEffort,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    references: Vec<RetrievalReference>,
}

#[derive(Debug, Deserialize)]
struct RetrievalReference {
    title: Option<String>,
    url: Option<String>,
    snippet: Option<String>,
    score: Option<f64>,
}

impl DocSearchTool {
    pub fn new(
        endpoint: impl Into<String>,
        knowledge_base: impl Into<String>,
        default_effort: DocEffort,
    ) -> Result<Self, ToolFailure> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ToolFailure::permanent(format!("doc client init failed: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            knowledge_base: knowledge_base.into(),
            default_effort,
            client,
        })
    }

    fn timeout_for(effort: DocEffort) -> Duration {
        match effort {
            DocEffort::Minimal => Duration::from_secs(20),
            DocEffort::Low => Duration::from_secs(45),
            DocEffort::Medium => Duration::from_secs(90),
        }
    }
}

#[async_trait::async_trait]
impl ToolAdapter for DocSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "doc_search".into(),
            description: "Search the product knowledge base. Returns a summary of the most \
                          relevant documents with citations."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "What to look for" },
                    "reasoning_effort": {
                        "type": "string",
                        "enum": ["minimal", "low", "medium"],
                        "description": "Retrieval planning depth"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, args: Value, cancel: CancelToken) -> Result<ToolOutput, ToolFailure> {
        let query = args
            .get("query")
            .and_then(|q| q.as_str())
            .ok_or_else(|| ToolFailure::permanent("doc_search: 'query' must be a string"))?;

        let effort = match args.get("reasoning_effort").and_then(|e| e.as_str()) {
            Some("minimal") => DocEffort::Minimal,
            Some("low") => DocEffort::Low,
            Some("medium") => DocEffort::Medium,
            Some(other) => {
                return Err(ToolFailure::permanent(format!(
                    "doc_search: unknown reasoning_effort '{other}'"
                )));
            }
            None => self.default_effort,
        };

        let body = serde_json::json!({
            "query": query,
            "knowledge_base": self.knowledge_base,
            "reasoning_effort": effort.as_str(),
        });

        let request = self
            .client
            .post(format!("{}/retrieve", self.endpoint.trim_end_matches('/')))
            .timeout(Self::timeout_for(effort))
            .json(&body)
            .send();

        let response = tokio::select! {
            resp = request => resp,
            _ = wait_cancelled(&cancel) => {
                return Err(ToolFailure::transient("retrieval cancelled"));
            }
        };

        let response = response.map_err(|e| {
            if e.is_timeout() {
                ToolFailure::transient("retrieval timed out")
            } else {
                tracing::warn!(error = %e, "doc retrieval request failed");
                ToolFailure::transient("retrieval service is unreachable")
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "doc retrieval returned error status");
            return Err(if status.is_server_error() {
                ToolFailure::transient(format!("retrieval service returned {status}"))
            } else {
                ToolFailure::permanent(format!("retrieval request rejected ({status})"))
            });
        }

        let parsed: RetrievalResponse = response
            .json()
            .await
            .map_err(|e| ToolFailure::permanent(format!("bad retrieval response: {e}")))?;

        let citations: Vec<Citation> = parsed
            .references
            .into_iter()
            .map(|r| Citation {
                index: 0,
                title: r.title,
                url: r.url,
                snippet: r.snippet,
                relevance: r.score,
            })
            .collect();

        Ok(ToolOutput {
            text_summary: if parsed.summary.is_empty() {
                "no matching documents found".into()
            } else {
                parsed.summary
            },
            structured: None,
            citations,
            truncated: false,
        })
    }
}

async fn wait_cancelled(cancel: &CancelToken) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
