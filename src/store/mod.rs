//! Persistence seams: session/message stores and the durable KV.
//!
//! The engine is written against these traits; deployments bring their own
//! backends. [`memory`] provides reference implementations used by tests and
//! embedded setups.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{ChatMessage, Session, SessionStatus, ToolResult};

/// Session CRUD plus the atomic status transition the mutual-exclusion
/// invariant rests on.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;

    async fn put(&self, session: &Session) -> Result<()>;

    /// Atomically swap `status` from `from` to `to`. Returns `false` (and
    /// leaves the session untouched) when the current status differs from
    /// `from`. Must be a real check-and-set on the backing store: two
    /// concurrent callers may both see `Ok(true)` only if they raced
    /// different transitions.
    async fn compare_and_set_status(
        &self,
        session_id: &str,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<bool>;

    /// Unconditional status write (cleanup paths).
    async fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<()>;
}

/// Message CRUD satisfying the pairing and idempotency invariants.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: &ChatMessage) -> Result<()>;

    /// Overwrite an existing message by id.
    async fn update(&self, message: &ChatMessage) -> Result<()>;

    async fn get(&self, session_id: &str, message_id: Uuid) -> Result<Option<ChatMessage>>;

    /// Ordered conversation for a session (insertion order).
    async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// Insert-or-overwrite a tool result keyed by `tool_call_id`, returning
    /// the updated message. Delivering the same result twice leaves exactly
    /// one entry.
    async fn upsert_tool_result(
        &self,
        session_id: &str,
        message_id: Uuid,
        result: &ToolResult,
    ) -> Result<ChatMessage>;
}

/// Durable KV backing the iteration counter, awaiting sets, and completion
/// signals. Values survive process restarts.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;

    /// Atomic increment-and-get, initializing absent keys at zero. The TTL
    /// applies when the key is created. Implementations must not emulate
    /// this with read-then-write.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64>;
}

/// Key layout for engine state in the KV.
pub mod keys {
    use uuid::Uuid;

    /// Round counter for a session's current episode.
    pub fn iterations(session_id: &str) -> String {
        format!("drover:iter:{session_id}")
    }

    /// Completion signal slot for a session.
    pub fn completion_signal(session_id: &str) -> String {
        format!("drover:signal:{session_id}")
    }

    /// Awaiting tool-call id set for a paused round.
    pub fn awaiting(session_id: &str, message_id: Uuid) -> String {
        format!("drover:awaiting:{session_id}:{message_id}")
    }
}
