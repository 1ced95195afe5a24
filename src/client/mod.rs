//! Model client contract and implementations.

pub mod http;
pub mod openai_like;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ChatMessage, ChunkStream};

pub use openai_like::OpenAiCompatClient;

/// Tool schema advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// How the model is allowed to pick tools.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
}

/// One streamed chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatStreamRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: ToolChoice,
}

impl ChatStreamRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }
}

/// Streaming chat interface the reason stage is written against.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Open a fresh completion stream. Each call is an independent attempt;
    /// the reason stage re-invokes this on retry.
    ///
    /// Token usage must arrive no later than the chunk carrying
    /// `finish_reason` — consumers stop reading there. Implementations over
    /// wire protocols that trail usage after the finish chunk fold it in
    /// before yielding (see [`OpenAiCompatClient`]).
    async fn chat_stream(&self, request: &ChatStreamRequest) -> Result<ChunkStream>;
}
