//! Shared test support: scripted model client, capture push, test harness.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_stream::iter as stream_iter;

use drover::billing::FlatRateLedger;
use drover::client::{ChatStreamRequest, ModelClient};
use drover::config::EngineConfig;
use drover::engine::{Engine, EngineDeps};
use drover::error::{DroverError, Result};
use drover::push::{PushChannel, SessionEvent};
use drover::store::memory::{MemoryKvStore, MemoryMessageStore, MemorySessionStore};
use drover::tools::ToolRegistry;
use drover::types::{ChunkStream, FinishReason, StreamChunk, TokenUsage};

/// One scripted response to a `chat_stream` call.
pub enum ScriptedCall {
    /// Yield these chunks as the stream.
    Chunks(Vec<Result<StreamChunk>>),
    /// Fail to open the stream.
    Fail(DroverError),
}

/// Model client that replays a script, one entry per call, and records every
/// request it sees. Calls past the end of the script produce a plain
/// "all done" reply so loops terminate deterministically.
pub struct ScriptedClient {
    calls: Mutex<VecDeque<ScriptedCall>>,
    requests: Mutex<Vec<ChatStreamRequest>>,
    call_count: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(calls: Vec<ScriptedCall>) -> Self {
        Self {
            calls: Mutex::new(calls.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatStreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn chat_stream(&self, request: &ChatStreamRequest) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());
        self.call_count.fetch_add(1, Ordering::SeqCst);
        match self.calls.lock().unwrap().pop_front() {
            Some(ScriptedCall::Fail(err)) => Err(err),
            Some(ScriptedCall::Chunks(chunks)) => Ok(Box::pin(stream_iter(chunks))),
            None => Ok(Box::pin(stream_iter(text_round("all done")))),
        }
    }
}

/// Chunks for a round that answers with plain text.
pub fn text_round(text: &str) -> Vec<Result<StreamChunk>> {
    let mut chunks: Vec<Result<StreamChunk>> = text
        .split_inclusive(' ')
        .map(|part| Ok(StreamChunk::content(part)))
        .collect();
    chunks.push(Ok(StreamChunk::finish(
        FinishReason::Stop,
        Some(TokenUsage::new(10, 5)),
    )));
    chunks
}

/// Chunks for a round that requests one tool call, with the arguments split
/// across deltas the way real streams deliver them.
pub fn tool_round(call_id: &str, tool: &str, argument_parts: &[&str]) -> Vec<Result<StreamChunk>> {
    let mut chunks: Vec<Result<StreamChunk>> = Vec::new();
    for (i, part) in argument_parts.iter().enumerate() {
        let first = i == 0;
        chunks.push(Ok(serde_json::from_value(serde_json::json!({
            "delta": {
                "tool_calls": [{
                    "index": 0,
                    "id": (if first { Some(call_id) } else { None }),
                    "function": {
                        "name": (if first { Some(tool) } else { None }),
                        "arguments": part,
                    }
                }]
            }
        }))
        .unwrap()));
    }
    chunks.push(Ok(StreamChunk::finish(
        FinishReason::ToolCalls,
        Some(TokenUsage::new(10, 5)),
    )));
    chunks
}

/// Push channel that captures every event.
#[derive(Default)]
pub struct CapturePush {
    events: Mutex<Vec<SessionEvent>>,
}

impl CapturePush {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Concatenate all pushed content deltas for assertions.
    pub fn pushed_content(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::ContentDelta { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn count_retractions(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, SessionEvent::ContentRetracted { .. }))
            .count()
    }
}

#[async_trait]
impl PushChannel for CapturePush {
    async fn emit(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Everything a test needs to drive and inspect an engine.
pub struct Harness {
    pub engine: Engine,
    pub client: Arc<ScriptedClient>,
    pub sessions: Arc<MemorySessionStore>,
    pub messages: Arc<MemoryMessageStore>,
    pub kv: Arc<MemoryKvStore>,
    pub ledger: Arc<FlatRateLedger>,
    pub push: Arc<CapturePush>,
}

impl Harness {
    pub fn new(calls: Vec<ScriptedCall>, tools: ToolRegistry) -> Self {
        Self::with_config(test_config(), calls, tools)
    }

    pub fn with_config(config: EngineConfig, calls: Vec<ScriptedCall>, tools: ToolRegistry) -> Self {
        let client = Arc::new(ScriptedClient::new(calls));
        let sessions = Arc::new(MemorySessionStore::new());
        let messages = Arc::new(MemoryMessageStore::new());
        let kv = Arc::new(MemoryKvStore::new());
        // Per-million rates chosen so one token costs one dollar: exact
        // arithmetic for billing assertions.
        let ledger = Arc::new(FlatRateLedger::new(1_000_000.0, 1_000_000.0));
        let push = Arc::new(CapturePush::default());
        let engine = Engine::new(
            config,
            EngineDeps {
                client: client.clone(),
                tools: Arc::new(tools),
                sessions: sessions.clone(),
                messages: messages.clone(),
                kv: kv.clone(),
                ledger: ledger.clone(),
                push: push.clone(),
            },
        );
        Self {
            engine,
            client,
            sessions,
            messages,
            kv,
            ledger,
            push,
        }
    }

    /// A second engine over the same stores, as after a process restart.
    pub fn restarted(&self, calls: Vec<ScriptedCall>, tools: ToolRegistry) -> (Engine, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(calls));
        let engine = Engine::new(
            test_config(),
            EngineDeps {
                client: client.clone(),
                tools: Arc::new(tools),
                sessions: self.sessions.clone(),
                messages: self.messages.clone(),
                kv: self.kv.clone(),
                ledger: self.ledger.clone(),
                push: self.push.clone(),
            },
        );
        (engine, client)
    }
}

/// Config with test-friendly delays.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        stream_retry_delay: std::time::Duration::from_millis(5),
        ..EngineConfig::default()
    }
}
