//! Canned tool results for demo mode.
//!
//! Each adapter returns a fixed [`ToolOutput`] keyed by tool name, so demo
//! turns exercise the full tool lifecycle (start/success events, citations,
//! persistence) without any upstream.

use serde_json::Value;

use fm_domain::cancel::CancelToken;
use fm_domain::tool::{Citation, ToolFailure, ToolOutput, ToolSpec};

use crate::ToolAdapter;

pub struct CannedTool {
    spec: ToolSpec,
}

impl CannedTool {
    pub fn new(spec: ToolSpec) -> Self {
        Self { spec }
    }

    /// The demo catalog: one canned adapter per real tool name.
    pub fn demo_set() -> Vec<Self> {
        vec![
            Self::new(ToolSpec {
                name: "sql_query".into(),
                description: "Run a read-only SQL query against the business data warehouse."
                    .into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" } },
                    "required": ["query"]
                }),
            }),
            Self::new(ToolSpec {
                name: "doc_search".into(),
                description: "Search the product knowledge base.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" } },
                    "required": ["query"]
                }),
            }),
            Self::new(ToolSpec {
                name: "web_search".into(),
                description: "Search the public web.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" } },
                    "required": ["query"]
                }),
            }),
        ]
    }
}

pub fn canned_output(tool_name: &str) -> ToolOutput {
    match tool_name {
        "sql_query" => ToolOutput {
            text_summary: "product | total\nMountain-200 | 1200\nRoad-250 | 950\nTouring-1000 | 810\n"
                .into(),
            structured: Some(serde_json::json!({
                "columns": ["product", "total"],
                "rows": [["Mountain-200", 1200], ["Road-250", 950], ["Touring-1000", 810]]
            })),
            citations: Vec::new(),
            truncated: false,
        },
        "doc_search" => ToolOutput {
            text_summary: "The Mountain-200 ships with a 38-tooth chainring and hydraulic \
                           disc brakes."
                .into(),
            structured: None,
            citations: vec![Citation {
                index: 0,
                title: Some("Mountain-200 specification".into()),
                url: Some("kb://products/mountain-200".into()),
                snippet: Some("38-tooth chainring, hydraulic disc brakes".into()),
                relevance: Some(0.94),
            }],
            truncated: false,
        },
        "web_search" => ToolOutput {
            text_summary: "Recent coverage highlights strong demand for touring bikes.".into(),
            structured: None,
            citations: vec![Citation {
                index: 0,
                title: Some("Cycling market update".into()),
                url: Some("https://example.com/cycling-market".into()),
                snippet: None,
                relevance: None,
            }],
            truncated: false,
        },
        other => ToolOutput {
            text_summary: format!("demo result for {other}"),
            structured: None,
            citations: Vec::new(),
            truncated: false,
        },
    }
}

#[async_trait::async_trait]
impl ToolAdapter for CannedTool {
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn invoke(&self, _args: Value, _cancel: CancelToken) -> Result<ToolOutput, ToolFailure> {
        Ok(canned_output(&self.spec.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_canned_output_lists_three_products() {
        let output = canned_output("sql_query");
        assert!(output.text_summary.contains("Mountain-200"));
        assert!(output.text_summary.contains("Road-250"));
        assert!(output.text_summary.contains("Touring-1000"));
    }

    #[test]
    fn doc_canned_output_has_scored_citation() {
        let output = canned_output("doc_search");
        assert_eq!(output.citations.len(), 1);
        assert!(output.citations[0].relevance.unwrap() > 0.9);
    }

    #[test]
    fn demo_set_covers_core_tools() {
        let names: Vec<String> = CannedTool::demo_set()
            .iter()
            .map(|t| t.spec().name)
            .collect();
        assert_eq!(names, vec!["sql_query", "doc_search", "web_search"]);
    }
}
