//! `fm-tools` — tool adapters and the process-wide tool catalog.
//!
//! Every external capability (warehouse SQL, agentic document retrieval,
//! web grounding, remote analytics) sits behind the same [`ToolAdapter`]
//! contract. The [`ToolCatalog`] owns the registered adapters, validates
//! model-supplied arguments against each spec's JSON schema before
//! dispatch, and hands invocations to the right adapter.

pub mod canned;
pub mod docs;
pub mod rpc;
pub mod sql;
pub mod web;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use fm_domain::cancel::CancelToken;
use fm_domain::tool::{ToolFailure, ToolOutput, ToolSpec};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolAdapter trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every tool adapter implements.
///
/// Adapters are cooperative: they honor the cancel token, apply their own
/// timeout, and never block the scheduler.
#[async_trait::async_trait]
pub trait ToolAdapter: Send + Sync {
    /// The catalog entry exposed to the LLM.
    fn spec(&self) -> ToolSpec;

    /// Invoke the tool with validated arguments.
    async fn invoke(&self, args: Value, cancel: CancelToken) -> Result<ToolOutput, ToolFailure>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The process-wide tool catalog: name → adapter.
#[derive(Default)]
pub struct ToolCatalog {
    adapters: HashMap<String, Arc<dyn ToolAdapter>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) {
        let name = adapter.spec().name;
        tracing::info!(tool = %name, "registered tool");
        self.adapters.insert(name, adapter);
    }

    pub fn has(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }

    /// The spec view for a mode's allowed-tool list. Unknown names are
    /// skipped so a mode can reference tools that are unconfigured in this
    /// deployment.
    pub fn specs_for(&self, allowed: &[String]) -> Vec<ToolSpec> {
        allowed
            .iter()
            .filter_map(|name| self.adapters.get(name).map(|a| a.spec()))
            .collect()
    }

    pub fn spec_of(&self, name: &str) -> Option<ToolSpec> {
        self.adapters.get(name).map(|a| a.spec())
    }

    /// Dispatch a validated call to the named adapter.
    pub async fn dispatch(
        &self,
        name: &str,
        args: Value,
        cancel: CancelToken,
    ) -> Result<ToolOutput, ToolFailure> {
        match self.adapters.get(name) {
            Some(adapter) => adapter.invoke(args, cancel).await,
            None => Err(ToolFailure::permanent(format!("unknown tool: {name}"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Argument validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate model-supplied arguments against a spec's parameter schema.
///
/// Covers the schema subset the catalog actually uses: top-level object,
/// `required` members present, and primitive `type` agreement per
/// property. Anything deeper is the adapter's concern.
pub fn validate_args(spec: &ToolSpec, args: &Value) -> Result<(), String> {
    let Some(args_obj) = args.as_object() else {
        return Err(format!("{}: arguments must be a JSON object", spec.name));
    };

    let schema = &spec.parameters;
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !args_obj.contains_key(key) {
                return Err(format!("{}: missing required argument '{key}'", spec.name));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in args_obj {
            let Some(prop) = props.get(key) else {
                // Unknown arguments are tolerated; the adapter ignores them.
                continue;
            };
            let Some(expected) = prop.get("type").and_then(|t| t.as_str()) else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !ok {
                return Err(format!(
                    "{}: argument '{key}' must be a {expected}",
                    spec.name
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ToolSpec {
        ToolSpec {
            name: "sql_query".into(),
            description: "Run SQL".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "limit": { "type": "integer" }
                },
                "required": ["query"]
            }),
        }
    }

    #[test]
    fn valid_args_pass() {
        let args = serde_json::json!({"query": "SELECT 1", "limit": 10});
        assert!(validate_args(&spec(), &args).is_ok());
    }

    #[test]
    fn missing_required_rejected() {
        let args = serde_json::json!({"limit": 10});
        let err = validate_args(&spec(), &args).unwrap_err();
        assert!(err.contains("query"));
    }

    #[test]
    fn wrong_type_rejected() {
        let args = serde_json::json!({"query": 42});
        let err = validate_args(&spec(), &args).unwrap_err();
        assert!(err.contains("string"));
    }

    #[test]
    fn non_object_args_rejected() {
        let args = serde_json::json!("SELECT 1");
        assert!(validate_args(&spec(), &args).is_err());
    }

    #[test]
    fn unknown_args_tolerated() {
        let args = serde_json::json!({"query": "SELECT 1", "extra": true});
        assert!(validate_args(&spec(), &args).is_ok());
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_fails_permanently() {
        let catalog = ToolCatalog::new();
        let err = catalog
            .dispatch("nope", serde_json::json!({}), CancelToken::new())
            .await
            .unwrap_err();
        assert!(!err.transient);
    }
}
