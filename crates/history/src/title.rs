//! Conversation title generation.
//!
//! Best effort: one short secondary-model completion; any failure falls
//! back to a truncation of the first user message.

use std::sync::Arc;

use futures_util::StreamExt;

use fm_domain::stream::CompletionEvent;
use fm_domain::tool::Message;
use fm_llm::{CompletionRequest, LlmClient};

const TITLE_PROMPT: &str =
    "Write a title of at most six words for a conversation that starts with the \
     following message. Reply with the title only, no quotes.";

pub struct TitleGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    max_chars: usize,
}

impl TitleGenerator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, max_chars: usize) -> Self {
        Self {
            client,
            model: model.into(),
            max_chars,
        }
    }

    /// Generate a title for a new conversation.
    pub async fn generate(&self, first_user_text: &str) -> String {
        match self.llm_title(first_user_text).await {
            Some(title) if !title.trim().is_empty() => {
                truncate(title.trim(), self.max_chars)
            }
            _ => truncate(first_user_text.trim(), self.max_chars),
        }
    }

    async fn llm_title(&self, first_user_text: &str) -> Option<String> {
        let req = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(TITLE_PROMPT),
                Message::user(first_user_text),
            ],
            ..Default::default()
        };

        let mut stream = match self.client.stream(req).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "title generation failed, falling back to truncation");
                return None;
            }
        };

        let mut title = String::new();
        while let Some(event) = stream.next().await {
            match event {
                Ok(CompletionEvent::TextDelta { text }) => title.push_str(&text),
                Ok(CompletionEvent::Done { .. }) => break,
                Ok(CompletionEvent::Error { message }) => {
                    tracing::warn!(error = %message, "title generation stream error");
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "title generation stream failed");
                    return None;
                }
            }
        }
        Some(title)
    }
}

/// Truncate to a character budget on a char boundary.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_within_budget_unchanged() {
        assert_eq!(truncate("Monthly sales", 64), "Monthly sales");
    }

    #[test]
    fn truncate_over_budget_marks_cut() {
        let long = "a".repeat(100);
        let result = truncate(&long, 10);
        assert_eq!(result.chars().count(), 10);
        assert!(result.ends_with('…'));
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        let ja = "月別売上を折れ線グラフで表示してください";
        let result = truncate(ja, 8);
        assert_eq!(result.chars().count(), 8);
    }
}
