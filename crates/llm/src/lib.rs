//! `fm-llm` — LLM client abstraction for Fathom.
//!
//! Two back-end shapes live behind one streaming interface:
//! - [`ResponsesClient`] — a Responses-style API with server-driven tool
//!   invocation events, reasoning deltas, and server-side conversation
//!   threads.
//! - [`ChatClient`] — a Chat-Completions-style API; tool calls are
//!   assembled from argument deltas, threads are client-local.
//!
//! [`DemoClient`] is a third, deterministic implementation used when demo
//! mode is enabled; it never touches the network.
//!
//! Which shape serves a turn is decided by agent mode and configuration in
//! the gateway — never by a request-time fallback chain.

pub mod chat;
pub mod demo;
pub mod registry;
pub mod responses;
mod sse;
pub mod traits;
mod util;

pub use chat::ChatClient;
pub use demo::DemoClient;
pub use registry::LlmClients;
pub use responses::ResponsesClient;
pub use traits::{ClientShape, CompletionRequest, LlmClient, ReasoningControls};
