//! Identifier validation.
//!
//! `conversation_id` and `user_id` are opaque to the system but bounded:
//! a small character set and a length cap, checked before any statement
//! touches the database.

use std::sync::LazyLock;

use regex::Regex;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static pattern compiles"));

/// Validate a conversation or user id.
pub fn validate_id(kind: &str, id: &str) -> Result<(), String> {
    if ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(format!(
            "{kind} must be 1-64 characters from [A-Za-z0-9_-]"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_uuid_like_ids() {
        assert!(validate_id("conversation_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
    }

    #[test]
    fn accepts_short_ids() {
        assert!(validate_id("user_id", "u_1").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_id("user_id", "").is_err());
    }

    #[test]
    fn rejects_over_length() {
        assert!(validate_id("conversation_id", &"a".repeat(65)).is_err());
    }

    #[test]
    fn rejects_sql_metacharacters() {
        assert!(validate_id("user_id", "u'; DROP TABLE--").is_err());
        assert!(validate_id("user_id", "u 1").is_err());
    }
}
