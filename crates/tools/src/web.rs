//! Web grounding search adapter.
//!
//! Timeout behavior differs from every other adapter: exceeding the hard
//! cap is a SUCCESS result with a "search timed out" summary and no
//! citations, so the model can still answer from its other sources.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use fm_domain::cancel::CancelToken;
use fm_domain::tool::{Citation, ToolFailure, ToolOutput, ToolSpec};

use crate::ToolAdapter;

pub struct WebSearchTool {
    project_endpoint: String,
    connection_name: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GroundingResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    results: Vec<GroundingResult>,
}

#[derive(Debug, Deserialize)]
struct GroundingResult {
    title: Option<String>,
    url: Option<String>,
    snippet: Option<String>,
}

impl WebSearchTool {
    pub fn new(
        project_endpoint: impl Into<String>,
        connection_name: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ToolFailure> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs + 10))
            .build()
            .map_err(|e| ToolFailure::permanent(format!("web client init failed: {e}")))?;
        Ok(Self {
            project_endpoint: project_endpoint.into(),
            connection_name: connection_name.into(),
            timeout: Duration::from_secs(timeout_secs),
            client,
        })
    }

    fn timed_out_output() -> ToolOutput {
        ToolOutput {
            text_summary: "search timed out — answer from other sources".into(),
            structured: None,
            citations: Vec::new(),
            truncated: false,
        }
    }
}

#[async_trait::async_trait]
impl ToolAdapter for WebSearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "web_search".into(),
            description: "Search the public web for current information. Returns grounded \
                          text with source citations."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" }
                },
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, args: Value, cancel: CancelToken) -> Result<ToolOutput, ToolFailure> {
        let query = args
            .get("query")
            .and_then(|q| q.as_str())
            .ok_or_else(|| ToolFailure::permanent("web_search: 'query' must be a string"))?;

        let body = serde_json::json!({
            "query": query,
            "connection": self.connection_name,
        });

        let request = self
            .client
            .post(format!(
                "{}/search",
                self.project_endpoint.trim_end_matches('/')
            ))
            .json(&body)
            .send();

        let response = tokio::select! {
            result = tokio::time::timeout(self.timeout, request) => match result {
                Ok(resp) => resp,
                // Hard cap exceeded: a success with no citations, not an error.
                Err(_) => return Ok(Self::timed_out_output()),
            },
            _ = wait_cancelled(&cancel) => {
                return Err(ToolFailure::transient("search cancelled"));
            }
        };

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Ok(Self::timed_out_output()),
            Err(e) => {
                tracing::warn!(error = %e, "web search request failed");
                return Err(ToolFailure::transient("search service is unreachable"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "web search returned error status");
            return Err(if status.is_server_error() {
                ToolFailure::transient(format!("search service returned {status}"))
            } else {
                ToolFailure::permanent(format!("search request rejected ({status})"))
            });
        }

        let parsed: GroundingResponse = response
            .json()
            .await
            .map_err(|e| ToolFailure::permanent(format!("bad search response: {e}")))?;

        let citations: Vec<Citation> = parsed
            .results
            .into_iter()
            .map(|r| Citation {
                index: 0,
                title: r.title,
                url: r.url,
                snippet: r.snippet,
                relevance: None,
            })
            .collect();

        Ok(ToolOutput {
            text_summary: if parsed.text.is_empty() {
                "no results found".into()
            } else {
                parsed.text
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_output_is_success_shaped() {
        let output = WebSearchTool::timed_out_output();
        assert!(output.text_summary.contains("search timed out"));
        assert!(output.citations.is_empty());
    }

    #[test]
    fn grounding_response_parses() {
        let raw = r#"{
            "text": "Touring bikes are in demand.",
            "results": [{"title": "Bike news", "url": "https://example.com/news"}]
        }"#;
        let parsed: GroundingResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].url.as_deref(), Some("https://example.com/news"));
    }
}
