//! `fm-history` — append-only conversation and message store.
//!
//! Conversations and messages are keyed by `(user, conversation)` and
//! persisted to Postgres over a pooled driver; every statement is
//! parameterized. A memory-backed store serves tests and database-less
//! demo deployments, and a no-op store backs `HISTORY_ENABLED=false`.

pub mod identity;
pub mod store;
pub mod title;
pub mod types;

pub use identity::validate_id;
pub use store::{HistoryStore, MemoryHistoryStore, NoopHistoryStore, PgHistoryStore};
pub use title::TitleGenerator;
pub use types::{Conversation, MessageRole, StoredMessage};
