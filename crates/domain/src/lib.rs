//! `fm-domain` — shared types for all Fathom crates.
//!
//! Holds the error taxonomy, the provider-agnostic streaming event model,
//! the tool/message data model, chart payloads, the turn request wire
//! shape, cancellation primitives, and the environment-driven configuration.

pub mod cancel;
pub mod chart;
pub mod config;
pub mod error;
pub mod stream;
pub mod tool;
pub mod turn;

pub use cancel::CancelToken;
pub use error::{Error, Result};
