//! History store implementations.
//!
//! [`PgHistoryStore`] is the production store: Postgres over a sqlx pool,
//! every statement parameterized, schema bootstrapped at startup.
//! [`MemoryHistoryStore`] backs tests and database-less demo deployments;
//! [`NoopHistoryStore`] backs `HISTORY_ENABLED=false`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use sqlx::postgres::PgPool;
use sqlx::Row;

use fm_domain::error::{Error, Result};

use crate::identity::validate_id;
use crate::title::{truncate, TitleGenerator};
use crate::types::{Conversation, MessageRole, StoredMessage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Resolve or create the conversation for this turn. When
    /// `conversation_id` is absent or unknown, a new conversation is
    /// created with a generated title.
    async fn ensure_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        first_user_text: &str,
    ) -> Result<Conversation>;

    /// Append messages atomically and advance the conversation's
    /// `updated_at`.
    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[StoredMessage],
    ) -> Result<()>;

    /// Conversations for a user, `updated_at` descending.
    async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>>;

    /// Messages for a conversation, strictly time-ordered.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()>;

    async fn delete_all(&self, user_id: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Postgres store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PgHistoryStore {
    pool: PgPool,
    titler: Option<TitleGenerator>,
    title_max_chars: usize,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool, titler: Option<TitleGenerator>, title_max_chars: usize) -> Self {
        Self {
            pool,
            titler,
            title_max_chars,
        }
    }

    /// Create the schema when missing. Runs once at startup.
    pub async fn bootstrap(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                conversation_id TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                title           TEXT NOT NULL,
                created_at      TIMESTAMPTZ NOT NULL,
                updated_at      TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                message_id      TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id)
                                ON DELETE CASCADE,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                citations       JSONB,
                tool_events     JSONB,
                created_at      TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user
             ON conversations (user_id, updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
             ON messages (conversation_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        tracing::info!("history schema ready");
        Ok(())
    }

    async fn make_title(&self, first_user_text: &str) -> String {
        match &self.titler {
            Some(titler) => titler.generate(first_user_text).await,
            None => truncate(first_user_text.trim(), self.title_max_chars),
        }
    }
}

fn from_sqlx(e: sqlx::Error) -> Error {
    Error::Sql(e.to_string())
}

fn row_to_conversation(row: &sqlx::postgres::PgRow) -> Conversation {
    Conversation {
        conversation_id: row.get("conversation_id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_message(row: &sqlx::postgres::PgRow) -> Result<StoredMessage> {
    let role: String = row.get("role");
    let citations: Option<serde_json::Value> = row.get("citations");
    let tool_events: Option<serde_json::Value> = row.get("tool_events");

    Ok(StoredMessage {
        message_id: row.get("message_id"),
        conversation_id: row.get("conversation_id"),
        role: role
            .parse::<MessageRole>()
            .map_err(Error::Internal)?,
        content: row.get("content"),
        citations: citations.map(serde_json::from_value).transpose()?,
        tool_events: tool_events.map(serde_json::from_value).transpose()?,
        created_at: row.get("created_at"),
    })
}

#[async_trait::async_trait]
impl HistoryStore for PgHistoryStore {
    async fn ensure_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        first_user_text: &str,
    ) -> Result<Conversation> {
        validate_id("user_id", user_id).map_err(Error::Validation)?;

        if let Some(id) = conversation_id {
            validate_id("conversation_id", id).map_err(Error::Validation)?;
            let existing = sqlx::query(
                "SELECT conversation_id, user_id, title, created_at, updated_at
                 FROM conversations WHERE conversation_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(from_sqlx)?;

            if let Some(row) = existing {
                return Ok(row_to_conversation(&row));
            }
        }

        let id = conversation_id
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let title = self.make_title(first_user_text).await;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO conversations (conversation_id, user_id, title, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&title)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        tracing::info!(conversation_id = %id, user_id, "conversation created");

        Ok(Conversation {
            conversation_id: id,
            user_id: user_id.into(),
            title,
            created_at: now,
            updated_at: now,
        })
    }

    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[StoredMessage],
    ) -> Result<()> {
        validate_id("conversation_id", conversation_id).map_err(Error::Validation)?;

        let mut tx = self.pool.begin().await.map_err(from_sqlx)?;

        for msg in messages {
            let citations = msg
                .citations
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?;
            let tool_events = msg
                .tool_events
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?;

            sqlx::query(
                "INSERT INTO messages
                 (message_id, conversation_id, role, content, citations, tool_events, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&msg.message_id)
            .bind(conversation_id)
            .bind(msg.role.as_str())
            .bind(&msg.content)
            .bind(citations)
            .bind(tool_events)
            .bind(msg.created_at)
            .execute(&mut *tx)
            .await
            .map_err(from_sqlx)?;
        }

        sqlx::query("UPDATE conversations SET updated_at = $1 WHERE conversation_id = $2")
            .bind(Utc::now())
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(from_sqlx)?;

        tx.commit().await.map_err(from_sqlx)?;
        Ok(())
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>> {
        validate_id("user_id", user_id).map_err(Error::Validation)?;

        let rows = sqlx::query(
            "SELECT conversation_id, user_id, title, created_at, updated_at
             FROM conversations WHERE user_id = $1
             ORDER BY updated_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit.clamp(1, 200))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)?;

        Ok(rows.iter().map(row_to_conversation).collect())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        validate_id("conversation_id", conversation_id).map_err(Error::Validation)?;

        let rows = sqlx::query(
            "SELECT message_id, conversation_id, role, content, citations, tool_events, created_at
             FROM messages WHERE conversation_id = $1
             ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)?;

        rows.iter().map(row_to_message).collect()
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        validate_id("conversation_id", conversation_id).map_err(Error::Validation)?;

        sqlx::query("DELETE FROM conversations WHERE conversation_id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(from_sqlx)?;
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<()> {
        validate_id("user_id", user_id).map_err(Error::Validation)?;

        sqlx::query("DELETE FROM conversations WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(from_sqlx)?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Memory-backed store for tests and database-less demo deployments.
pub struct MemoryHistoryStore {
    inner: RwLock<MemoryInner>,
    title_max_chars: usize,
}

#[derive(Default)]
struct MemoryInner {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<StoredMessage>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(MemoryInner::default()),
            title_max_chars: 64,
        })
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn ensure_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        first_user_text: &str,
    ) -> Result<Conversation> {
        validate_id("user_id", user_id).map_err(Error::Validation)?;
        if let Some(id) = conversation_id {
            validate_id("conversation_id", id).map_err(Error::Validation)?;
            if let Some(conv) = self.inner.read().conversations.get(id) {
                return Ok(conv.clone());
            }
        }

        let id = conversation_id
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = Utc::now();
        let conv = Conversation {
            conversation_id: id.clone(),
            user_id: user_id.into(),
            title: truncate(first_user_text.trim(), self.title_max_chars),
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write();
        inner.conversations.insert(id.clone(), conv.clone());
        inner.messages.entry(id).or_default();
        Ok(conv)
    }

    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[StoredMessage],
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.conversations.contains_key(conversation_id) {
            return Err(Error::Validation(format!(
                "unknown conversation: {conversation_id}"
            )));
        }
        inner
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .extend(messages.iter().cloned());
        if let Some(conv) = inner.conversations.get_mut(conversation_id) {
            conv.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>> {
        let inner = self.inner.read();
        let mut convs: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        convs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(convs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.clamp(1, 200) as usize)
            .collect())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let inner = self.inner.read();
        let mut messages = inner
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        inner.conversations.remove(conversation_id);
        inner.messages.remove(conversation_id);
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let ids: Vec<String> = inner
            .conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.conversation_id.clone())
            .collect();
        for id in ids {
            inner.conversations.remove(&id);
            inner.messages.remove(&id);
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// No-op store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Store used when history is disabled: resolves conversations so the turn
/// pipeline is unchanged, persists nothing.
#[derive(Default)]
pub struct NoopHistoryStore;

#[async_trait::async_trait]
impl HistoryStore for NoopHistoryStore {
    async fn ensure_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        first_user_text: &str,
    ) -> Result<Conversation> {
        let now = Utc::now();
        Ok(Conversation {
            conversation_id: conversation_id
                .map(String::from)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            user_id: user_id.into(),
            title: truncate(first_user_text.trim(), 64),
            created_at: now,
            updated_at: now,
        })
    }

    async fn append_messages(&self, _: &str, _: &[StoredMessage]) -> Result<()> {
        Ok(())
    }

    async fn list_conversations(&self, _: &str, _: i64, _: i64) -> Result<Vec<Conversation>> {
        Ok(Vec::new())
    }

    async fn list_messages(&self, _: &str) -> Result<Vec<StoredMessage>> {
        Ok(Vec::new())
    }

    async fn delete_conversation(&self, _: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_all(&self, _: &str) -> Result<()> {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
