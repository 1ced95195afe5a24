//! Core data model: sessions, messages, tool calls/results, streaming.

pub mod message;
pub mod session;
pub mod stream;
pub mod usage;

pub use message::{
    history_for_prompt, ChatMessage, FinishReason, Role, TimingMetadata, ToolCall, ToolResult,
};
pub use session::{CompletionSignal, EpisodeOutcome, Session, SessionStatus, StopReason};
pub use stream::{ChunkStream, FunctionDelta, StreamChunk, StreamDelta, ToolCallDelta};
pub use usage::{Cost, TokenUsage};
