//! Analytics tool manager — discovers the remote tool set and dispatches
//! calls.
//!
//! `tools/list` runs exactly once per process; each discovered tool is
//! exposed as an individual catalog entry under its server-declared name.
//! On call failure only the JSON-RPC `message` is surfaced to the model;
//! the `code` travels on the tool event record. The orchestrator never
//! retries within a turn.

use std::time::Duration;

use serde_json::Value;

use fm_domain::cancel::CancelToken;
use fm_domain::config::RpcConfig;
use fm_domain::tool::{ToolFailure, ToolOutput, ToolSpec};

use crate::client::{RpcHttpClient, RpcTransportError};
use crate::protocol::{render_call_result, RpcToolDef, ToolsListResult};

pub struct RpcToolManager {
    client: Option<RpcHttpClient>,
    tools: Vec<RpcToolDef>,
}

impl RpcToolManager {
    /// An empty manager (RPC disabled or unconfigured).
    pub fn empty() -> Self {
        Self {
            client: None,
            tools: Vec::new(),
        }
    }

    /// Discover the tool set from the configured endpoint.
    ///
    /// Discovery failure disables the analytics tools for the process
    /// rather than aborting startup.
    pub async fn discover(config: &RpcConfig) -> Self {
        if !config.enabled {
            return Self::empty();
        }
        let Some(url) = &config.url else {
            return Self::empty();
        };

        let client = match RpcHttpClient::new(url.clone(), Duration::from_secs(config.timeout_secs))
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "failed to construct RPC client, analytics tools disabled");
                return Self::empty();
            }
        };

        let tools = match client.send_request("tools/list", None).await {
            Ok(resp) => match resp.into_result() {
                Ok(value) => match serde_json::from_value::<ToolsListResult>(value) {
                    Ok(r) => r.tools,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse tools/list result");
                        Vec::new()
                    }
                },
                Err(e) => {
                    tracing::warn!(code = e.code, error = %e.message, "tools/list returned error");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "tools/list failed, analytics tools disabled");
                Vec::new()
            }
        };

        tracing::info!(tool_count = tools.len(), endpoint = %url, "analytics tool server discovered");

        Self {
            client: Some(client),
            tools,
        }
    }

    /// Catalog entries for every discovered tool.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            })
            .collect()
    }

    /// Whether `name` is one of the discovered tools.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// Call a remote tool.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancelToken,
    ) -> Result<ToolOutput, ToolFailure> {
        let Some(client) = &self.client else {
            return Err(ToolFailure::permanent("analytics tool server is not configured"));
        };
        if !self.has_tool(name) {
            return Err(ToolFailure::permanent(format!("unknown analytics tool: {name}")));
        }

        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let call = client.send_request("tools/call", Some(params));

        let response = tokio::select! {
            resp = call => resp,
            _ = poll_cancel(cancel) => {
                return Err(ToolFailure::transient("analytics call cancelled"));
            }
        };

        let response = response.map_err(|e| match e {
            RpcTransportError::Timeout => ToolFailure {
                message: "analytics server timed out".into(),
                transient: true,
                code: None,
                retry_after_ms: Some(5_000),
            },
            RpcTransportError::Status(status) if status >= 500 => ToolFailure {
                message: format!("analytics server returned {status}"),
                transient: true,
                code: None,
                retry_after_ms: Some(5_000),
            },
            other => {
                tracing::warn!(error = %other, "analytics transport failure");
                ToolFailure {
                    message: "analytics server is unreachable".into(),
                    transient: true,
                    code: None,
                    retry_after_ms: Some(10_000),
                }
            }
        })?;

        match response.into_result() {
            Ok(value) => {
                let (text, is_error) = render_call_result(&value);
                if is_error {
                    return Err(ToolFailure::permanent(text));
                }
                Ok(ToolOutput {
                    text_summary: text,
                    structured: Some(value),
                    citations: Vec::new(),
                    truncated: false,
                })
            }
            // Only `message` reaches the model; `code` rides on the event.
            Err(err) => Err(ToolFailure {
                message: err.message,
                transient: false,
                code: Some(err.code),
                retry_after_ms: None,
            }),
        }
    }
}

async fn poll_cancel(cancel: &CancelToken) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manager_has_no_specs() {
        let manager = RpcToolManager::empty();
        assert!(manager.specs().is_empty());
        assert!(!manager.has_tool("sales_forecast"));
    }

    #[tokio::test]
    async fn call_on_empty_manager_is_permanent_failure() {
        let manager = RpcToolManager::empty();
        let cancel = CancelToken::new();
        let err = manager
            .call_tool("sales_forecast", serde_json::json!({}), &cancel)
            .await
            .unwrap_err();
        assert!(!err.transient);
    }

    #[tokio::test]
    async fn disabled_config_discovers_nothing() {
        let manager = RpcToolManager::discover(&RpcConfig::default()).await;
        assert!(manager.specs().is_empty());
    }
}
