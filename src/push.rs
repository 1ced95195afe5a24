//! Best-effort realtime push: events, channel seam, and the content debouncer.
//!
//! Push delivery never affects orchestration: implementations log their own
//! failures, and loss or delay leaves the persisted state authoritative.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ToolCall, ToolResult};

/// Events pushed to realtime consumers during an episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    RoundStarted {
        session_id: String,
        round: u64,
    },
    ContentDelta {
        session_id: String,
        message_id: Uuid,
        text: String,
    },
    /// Previously pushed partial content for this message is void (the
    /// stream is being retried from scratch).
    ContentRetracted {
        session_id: String,
        message_id: Uuid,
    },
    ToolCallStarted {
        session_id: String,
        message_id: Uuid,
        call: ToolCall,
    },
    ToolResultReady {
        session_id: String,
        message_id: Uuid,
        result: ToolResult,
    },
    EpisodePaused {
        session_id: String,
        message_id: Uuid,
        awaiting: Vec<String>,
    },
    EpisodeCompleted {
        session_id: String,
    },
    EpisodeCancelled {
        session_id: String,
    },
    EpisodeErrored {
        session_id: String,
        error: String,
    },
}

/// Fire-and-forget push seam.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Deliver best-effort. Implementations swallow and log transport
    /// failures; callers never observe them.
    async fn emit(&self, event: SessionEvent);
}

/// Push channel that drops everything.
#[derive(Debug, Default)]
pub struct NullPush;

#[async_trait]
impl PushChannel for NullPush {
    async fn emit(&self, _event: SessionEvent) {}
}

/// Buffers content deltas and releases them at a minimum interval.
///
/// The first fragment flushes immediately; later fragments coalesce until
/// the interval has elapsed. [`Debouncer::flush`] drains whatever is left at
/// stream end, and [`Debouncer::reset`] discards the buffer for a retry.
#[derive(Debug)]
pub struct Debouncer {
    interval: Duration,
    buffer: String,
    last_flush: Option<Instant>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            buffer: String::new(),
            last_flush: None,
        }
    }

    /// Append a fragment; returns text to emit when the interval is due.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.buffer.push_str(fragment);
        let due = match self.last_flush {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        };
        if due && !self.buffer.is_empty() {
            self.last_flush = Some(Instant::now());
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Drain any buffered remainder.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            self.last_flush = Some(Instant::now());
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Drop buffered content and interval state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_flush = None;
    }
}
