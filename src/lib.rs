//! Drover — durable agent-round orchestration.
//!
//! Drives multi-turn, tool-calling conversations against a streaming model:
//! each round streams the model (reason), executes requested tools (act),
//! then settles accounting and decides continuation (observe). Round state
//! is persisted through pluggable stores, so a round paused on a remote
//! tool survives process restarts and resumes when its results arrive.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use drover::prelude::*;
//!
//! # async fn example() -> drover::error::Result<()> {
//! let engine = Engine::new(
//!     EngineConfig::default(),
//!     EngineDeps {
//!         client: Arc::new(OpenAiCompatClient::new("sk-...", "https://api.openai.com/v1")),
//!         tools: Arc::new(ToolRegistry::new().with(Arc::new(CompleteTool))),
//!         sessions: Arc::new(MemorySessionStore::new()),
//!         messages: Arc::new(MemoryMessageStore::new()),
//!         kv: Arc::new(MemoryKvStore::new()),
//!         ledger: Arc::new(FlatRateLedger::new(2.0, 8.0)),
//!         push: Arc::new(NullPush),
//!     },
//! );
//! let outcome = engine.submit(SubmitRequest::new("session-1", "Hello!")).await?;
//! # Ok(())
//! # }
//! ```

pub mod accumulate;
pub mod billing;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod push;
pub mod session;
pub mod store;
pub mod tools;
pub mod types;
