//! HTTP transport for the JSON-RPC analytics server.
//!
//! One POST per request; ids are monotonic per process. The server is a
//! plain JSON-RPC-over-HTTP endpoint, so no connection state is kept
//! beyond the reqwest pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcTransportError {
    #[error("transport I/O error: {0}")]
    Http(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timeout waiting for response")]
    Timeout,

    #[error("server returned HTTP {0}")]
    Status(u16),
}

pub struct RpcHttpClient {
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
    timeout: Duration,
}

impl RpcHttpClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RpcTransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcTransportError::Http(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            next_id: AtomicU64::new(1),
            timeout,
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a JSON-RPC request and wait for the corresponding response.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, RpcTransportError> {
        let id = self.next_request_id();
        let request = JsonRpcRequest::new(id, method, params);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcTransportError::Timeout
                } else {
                    RpcTransportError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcTransportError::Status(status.as_u16()));
        }

        let parsed: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcTransportError::Http(e.to_string()))?;

        if parsed.id != id {
            tracing::warn!(
                expected = id,
                got = parsed.id,
                "JSON-RPC response id mismatch"
            );
        }

        Ok(parsed)
    }
}
