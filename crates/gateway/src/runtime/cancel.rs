//! Per-turn cancellation registry.
//!
//! Each running turn registers a [`CancelToken`] under its cancel key
//! (the conversation id, or the turn id for brand-new conversations).
//! `POST /v1/turn/:id/cancel` and client disconnects signal it; the
//! runtime loop, in-flight tool calls, and the keepalive task all observe
//! the same token.

use std::collections::HashMap;

use parking_lot::Mutex;

use fm_domain::cancel::CancelToken;

/// Tracks active cancellation tokens per cancel key.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new cancel token for a turn.
    pub fn register(&self, key: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(key.to_owned(), token.clone());
        token
    }

    /// Cancel a running turn. Returns true if a token was found.
    pub fn cancel(&self, key: &str) -> bool {
        if let Some(token) = self.tokens.lock().get(key) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Remove the token for a turn (called when the turn completes).
    pub fn remove(&self, key: &str) {
        self.tokens.lock().remove(key);
    }

    /// Check if a turn is currently running under this key.
    pub fn is_running(&self, key: &str) -> bool {
        self.tokens.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_cancel() {
        let map = CancelMap::new();
        let token = map.register("c1");
        assert!(!token.is_cancelled());
        assert!(map.is_running("c1"));

        assert!(map.cancel("c1"));
        assert!(token.is_cancelled());

        map.remove("c1");
        assert!(!map.is_running("c1"));
        assert!(!map.cancel("c1"));
    }

    #[test]
    fn cancel_nonexistent_returns_false() {
        let map = CancelMap::new();
        assert!(!map.cancel("ghost"));
    }

    #[test]
    fn remove_is_idempotent() {
        let map = CancelMap::new();
        map.register("c1");
        map.remove("c1");
        map.remove("c1");
        assert!(!map.is_running("c1"));
    }

    #[test]
    fn register_replaces_previous_token() {
        let map = CancelMap::new();
        let old_token = map.register("c1");
        let new_token = map.register("c1");

        map.cancel("c1");
        assert!(new_token.is_cancelled());
        assert!(!old_token.is_cancelled());
    }
}
