//! Durable, session-scoped round counter.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::store::{keys, KvStore};

/// Bounds episode length across process restarts.
///
/// Backed by the KV's atomic increment so concurrent restarts of the same
/// round never lose updates; the TTL reclaims counters for episodes that
/// died without cleanup.
#[derive(Clone)]
pub struct IterationCounter {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl IterationCounter {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Increment and return the new round number (1-based).
    pub async fn increment(&self, session_id: &str) -> Result<u64> {
        self.kv
            .incr(&keys::iterations(session_id), Some(self.ttl))
            .await
    }

    /// Rounds consumed so far in the current episode.
    pub async fn current(&self, session_id: &str) -> Result<u64> {
        Ok(self
            .kv
            .get(&keys::iterations(session_id))
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    /// Reset at episode end (completion or cancellation cleanup).
    pub async fn reset(&self, session_id: &str) -> Result<()> {
        self.kv.del(&keys::iterations(session_id)).await
    }
}
