//! `fm-rpc-client` — JSON-RPC 2.0 client for the business analytics tool
//! server.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types (`tools/list`, `tools/call`).
//! - An HTTP transport posting one request per call to a configured
//!   endpoint.
//! - An [`RpcToolManager`] that discovers the tool set once per process and
//!   exposes each remote tool as an individual catalog entry.

pub mod client;
pub mod manager;
pub mod protocol;

pub use client::{RpcHttpClient, RpcTransportError};
pub use manager::RpcToolManager;
pub use protocol::RpcToolDef;
