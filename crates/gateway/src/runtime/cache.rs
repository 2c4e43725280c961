//! Conversation thread cache.
//!
//! Maps a conversation id to the live provider thread handle for it, with
//! idle-TTL expiry and LRU eviction at capacity. The cache owns each
//! handle exclusively: any eviction path (capacity, TTL sweep, manual
//! removal, mode change) tears the provider thread down so server-side
//! resources are released. Teardown is fire-and-forget; failures are
//! logged and swallowed.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use fm_domain::error::Result;
use fm_domain::turn::AgentMode;
use fm_llm::LlmClient;

/// An owned provider thread. Dropping it does nothing; release goes
/// through [`ThreadHandle::teardown`] so the provider call is explicit.
pub struct ThreadHandle {
    pub conversation_id: String,
    pub thread_id: String,
    pub mode: AgentMode,
    pub created_at: Instant,
    pub last_used_at: Instant,
    client: Arc<dyn LlmClient>,
}

impl ThreadHandle {
    /// Release the provider-side thread in the background.
    pub fn teardown(self) {
        let client = self.client;
        let thread_id = self.thread_id;
        let conversation_id = self.conversation_id;
        tokio::spawn(async move {
            if let Err(e) = client.delete_thread(&thread_id).await {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    thread_id = %thread_id,
                    error = %e,
                    "thread teardown failed"
                );
            } else {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    thread_id = %thread_id,
                    "thread released"
                );
            }
        });
    }
}

pub struct ThreadCache {
    inner: Mutex<LruCache<String, ThreadHandle>>,
    ttl: Duration,
}

impl ThreadCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Get the thread for a conversation, creating one on miss.
    ///
    /// A cached handle is reused only when its mode matches and it hasn't
    /// idled past the TTL; otherwise it is torn down and replaced, so a
    /// conversation never holds more than one live handle.
    pub async fn acquire(
        &self,
        conversation_id: &str,
        mode: AgentMode,
        client: Arc<dyn LlmClient>,
    ) -> Result<String> {
        self.sweep_expired();

        {
            let mut cache = self.inner.lock();
            match cache.get_mut(conversation_id) {
                Some(handle) if handle.mode == mode => {
                    handle.last_used_at = Instant::now();
                    return Ok(handle.thread_id.clone());
                }
                Some(_) => {
                    // Mode changed: the old topology's thread is useless.
                    if let Some(stale) = cache.pop(conversation_id) {
                        stale.teardown();
                    }
                }
                None => {}
            }
        }

        // Create outside the lock; the per-conversation turn lock prevents
        // two turns racing to create a thread for the same conversation.
        let thread_id = client.create_thread().await?;
        let now = Instant::now();
        let handle = ThreadHandle {
            conversation_id: conversation_id.to_owned(),
            thread_id: thread_id.clone(),
            mode,
            created_at: now,
            last_used_at: now,
            client,
        };

        let evicted = self.inner.lock().push(conversation_id.to_owned(), handle);
        if let Some((key, old)) = evicted {
            if key != conversation_id {
                tracing::debug!(conversation_id = %key, "thread evicted at capacity");
                old.teardown();
            }
        }

        Ok(thread_id)
    }

    /// Remove and tear down a conversation's thread (e.g. on a "new
    /// conversation" request). Resources release asynchronously.
    pub fn remove(&self, conversation_id: &str) {
        if let Some(handle) = self.inner.lock().pop(conversation_id) {
            handle.teardown();
        }
    }

    /// Evict every handle whose idle time exceeds the TTL.
    pub fn sweep_expired(&self) {
        let mut cache = self.inner.lock();
        let expired: Vec<String> = cache
            .iter()
            .filter(|(_, h)| h.last_used_at.elapsed() > self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            if let Some(handle) = cache.pop(&key) {
                tracing::debug!(conversation_id = %key, "thread expired");
                handle.teardown();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
