//! Convenience re-exports for common use.

pub use crate::billing::{BillingLedger, FlatRateLedger};
pub use crate::client::{ChatStreamRequest, ModelClient, OpenAiCompatClient, ToolSchema};
pub use crate::config::EngineConfig;
pub use crate::engine::{Engine, EngineDeps, ResumeOutcome, SubmitRequest};
pub use crate::error::{DroverError, Result};
pub use crate::push::{NullPush, PushChannel, SessionEvent};
pub use crate::store::memory::{MemoryKvStore, MemoryMessageStore, MemorySessionStore};
pub use crate::store::{KvStore, MessageStore, SessionStore};
pub use crate::tools::{CompleteTool, FnTool, RemoteTool, ToolExecutor, ToolOutcome, ToolRegistry};
pub use crate::types::{
    ChatMessage, CompletionSignal, EpisodeOutcome, FinishReason, Role, Session, SessionStatus,
    StopReason, TokenUsage, ToolCall, ToolResult,
};
