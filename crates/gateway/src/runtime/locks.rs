//! Per-conversation turn locks.
//!
//! A conversation runs at most one turn at a time; a second request while
//! one is in flight is rejected immediately so the caller can retry after
//! its stream finishes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct TurnLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for TurnLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the turn lock for a conversation, or fail fast when one is
    /// already running. Hold the permit for the turn; it releases on drop.
    pub fn try_acquire(&self, conversation_id: &str) -> Result<OwnedSemaphorePermit, TurnBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(conversation_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.try_acquire_owned().map_err(|_| TurnBusy)
    }

    /// Number of tracked conversations (for monitoring).
    pub fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop locks that aren't actively held.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// Error returned when a conversation already has a turn in flight.
#[derive(Debug)]
pub struct TurnBusy;

impl std::fmt::Display for TurnBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a turn is already in progress for this conversation")
    }
}

impl std::error::Error for TurnBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_turns_allowed() {
        let map = TurnLockMap::new();
        let permit = map.try_acquire("c1").unwrap();
        drop(permit);
        let permit = map.try_acquire("c1").unwrap();
        drop(permit);
    }

    #[test]
    fn concurrent_turn_rejected() {
        let map = TurnLockMap::new();
        let _held = map.try_acquire("c1").unwrap();
        assert!(map.try_acquire("c1").is_err());
    }

    #[test]
    fn different_conversations_independent() {
        let map = TurnLockMap::new();
        let _p1 = map.try_acquire("c1").unwrap();
        let _p2 = map.try_acquire("c2").unwrap();
        assert_eq!(map.lock_count(), 2);
    }

    #[test]
    fn prune_removes_released_locks() {
        let map = TurnLockMap::new();
        {
            let _p = map.try_acquire("c1").unwrap();
        }
        map.prune_idle();
        assert_eq!(map.lock_count(), 0);
    }
}
