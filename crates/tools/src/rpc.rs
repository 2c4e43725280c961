//! Catalog adapter for remote analytics tools.
//!
//! Each tool discovered from the JSON-RPC server gets its own catalog
//! entry wrapping the shared [`RpcToolManager`].

use std::sync::Arc;

use serde_json::Value;

use fm_domain::cancel::CancelToken;
use fm_domain::tool::{ToolFailure, ToolOutput, ToolSpec};
use fm_rpc_client::RpcToolManager;

use crate::ToolAdapter;

pub struct RpcTool {
    manager: Arc<RpcToolManager>,
    spec: ToolSpec,
}

impl RpcTool {
    pub fn new(manager: Arc<RpcToolManager>, spec: ToolSpec) -> Self {
        Self { manager, spec }
    }

    /// One adapter per discovered remote tool.
    pub fn all(manager: Arc<RpcToolManager>) -> Vec<Self> {
        manager
            .specs()
            .into_iter()
            .map(|spec| Self::new(manager.clone(), spec))
            .collect()
    }
}

#[async_trait::async_trait]
impl ToolAdapter for RpcTool {
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn invoke(&self, args: Value, cancel: CancelToken) -> Result<ToolOutput, ToolFailure> {
        self.manager.call_tool(&self.spec.name, args, &cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manager_yields_no_adapters() {
        let manager = Arc::new(RpcToolManager::empty());
        assert!(RpcTool::all(manager).is_empty());
    }
}
