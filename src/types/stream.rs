//! Streaming wire types for the model client contract.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::message::FinishReason;
use super::usage::TokenUsage;
use crate::error::DroverError;

/// One chunk of a streamed chat completion.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamChunk {
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Incremental payload within a chunk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

/// Partial tool call, tagged with its slot index in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub function: FunctionDelta,
}

/// Partial function payload: `arguments` fragments are appended, never
/// replaced, across the deltas for one index.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl StreamChunk {
    /// A pure content delta.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            delta: StreamDelta {
                content: Some(text.into()),
                tool_calls: Vec::new(),
            },
            ..Default::default()
        }
    }

    /// A terminal chunk carrying the finish reason and, usually, usage.
    pub fn finish(reason: FinishReason, usage: Option<TokenUsage>) -> Self {
        Self {
            delta: StreamDelta::default(),
            finish_reason: Some(reason),
            usage,
        }
    }
}

/// Boxed chunk stream returned by a model client.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, DroverError>>;
