//! In-memory reference implementations of the persistence seams.
//!
//! Single-process semantics with the same contracts as a real backend:
//! the status CAS and counter increment are atomic under one lock, and KV
//! entries honor their TTLs (lazily, on access).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{KvStore, MessageStore, SessionStore};
use crate::error::{DroverError, Result};
use crate::types::{ChatMessage, Session, SessionStatus, ToolResult};

/// Sessions held in a process-local map.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn put(&self, session: &Session) -> Result<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        session_id: &str,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<bool> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| DroverError::SessionNotFound(session_id.to_string()))?;
        if session.status != from {
            return Ok(false);
        }
        session.status = to;
        session.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| DroverError::SessionNotFound(session_id.to_string()))?;
        session.status = status;
        session.updated_at = Utc::now();
        Ok(())
    }
}

/// Messages held per session in insertion order.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    conversations: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: &ChatMessage) -> Result<()> {
        self.conversations
            .lock()
            .unwrap()
            .entry(message.session_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn update(&self, message: &ChatMessage) -> Result<()> {
        let mut conversations = self.conversations.lock().unwrap();
        let messages = conversations
            .get_mut(&message.session_id)
            .ok_or_else(|| DroverError::SessionNotFound(message.session_id.clone()))?;
        let slot = messages
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or_else(|| DroverError::MessageNotFound {
                session_id: message.session_id.clone(),
                message_id: message.id.to_string(),
            })?;
        *slot = message.clone();
        Ok(())
    }

    async fn get(&self, session_id: &str, message_id: Uuid) -> Result<Option<ChatMessage>> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .get(session_id)
            .and_then(|messages| messages.iter().find(|m| m.id == message_id).cloned()))
    }

    async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_tool_result(
        &self,
        session_id: &str,
        message_id: Uuid,
        result: &ToolResult,
    ) -> Result<ChatMessage> {
        let mut conversations = self.conversations.lock().unwrap();
        let messages = conversations
            .get_mut(session_id)
            .ok_or_else(|| DroverError::SessionNotFound(session_id.to_string()))?;
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| DroverError::MessageNotFound {
                session_id: session_id.to_string(),
                message_id: message_id.to_string(),
            })?;
        message.upsert_tool_result(result.clone());
        Ok(message.clone())
    }
}

#[derive(Debug, Clone)]
struct KvEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// TTL-aware KV held in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, KvEntry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            KvEntry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64> {
        let mut entries = self.entries.lock().unwrap();
        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired() => entry.value.parse::<u64>().map_err(|_| {
                DroverError::Store(format!("non-numeric value under counter key {key}"))
            })?,
            _ => 0,
        };
        let next = current + 1;
        let expires_at = match entries.get(key) {
            Some(entry) if !entry.is_expired() => entry.expires_at,
            _ => ttl.map(|d| Instant::now() + d),
        };
        entries.insert(
            key.to_string(),
            KvEntry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }
}
