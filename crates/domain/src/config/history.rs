use super::{env_bool, env_string, env_u64};

/// Conversation history persistence settings.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// `HISTORY_ENABLED` (default true).
    pub enabled: bool,
    /// `HISTORY_URL` — Postgres DSN for the history database.
    pub url: Option<String>,
    /// Generated-title length cap, characters.
    pub title_max_chars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            title_max_chars: 64,
        }
    }
}

impl HistoryConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env_bool("HISTORY_ENABLED", true),
            url: env_string("HISTORY_URL"),
            title_max_chars: env_u64("HISTORY_TITLE_MAX_CHARS", 64) as usize,
        }
    }
}
