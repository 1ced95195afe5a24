//! OpenAI-compatible Chat Completions streaming client.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use super::http::{bearer_headers, parse_sse_data, shared_client, status_to_error};
use super::{ChatStreamRequest, ModelClient, ToolChoice};
use crate::error::{DroverError, Result};
use crate::types::{
    ChatMessage, ChunkStream, FinishReason, Role, StreamChunk, StreamDelta, TokenUsage,
    ToolCallDelta,
};

/// Streaming client for any endpoint speaking the OpenAI chat protocol.
pub struct OpenAiCompatClient {
    api_key: String,
    base_url: String,
}

impl OpenAiCompatClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    fn build_request_body(&self, request: &ChatStreamRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        for message in &request.messages {
            append_wire_messages(&mut messages, message);
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        let obj = body.as_object_mut().unwrap();

        if !request.tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), tool_defs.into());
            let choice = match request.tool_choice {
                ToolChoice::Auto => "auto",
                ToolChoice::None => "none",
                ToolChoice::Required => "required",
            };
            obj.insert("tool_choice".into(), choice.into());
        }

        body
    }
}

/// Render one stored message as its wire form: an assistant message carrying
/// tool calls is followed by one `tool` message per recorded result.
fn append_wire_messages(out: &mut Vec<serde_json::Value>, message: &ChatMessage) {
    match message.role {
        Role::User => out.push(serde_json::json!({
            "role": "user",
            "content": message.content,
        })),
        Role::Assistant => {
            let mut wire = serde_json::json!({
                "role": "assistant",
                "content": message.content,
            });
            if !message.tool_calls.is_empty() {
                let calls: Vec<serde_json::Value> = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        serde_json::json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments,
                            }
                        })
                    })
                    .collect();
                wire.as_object_mut()
                    .unwrap()
                    .insert("tool_calls".into(), calls.into());
            }
            out.push(wire);
            for result in &message.tool_results {
                out.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": result.tool_call_id,
                    "content": result.observation(),
                }));
            }
        }
        Role::Tool => {
            for result in &message.tool_results {
                out.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": result.tool_call_id,
                    "content": result.observation(),
                }));
            }
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn chat_stream(&self, request: &ChatStreamRequest) -> Result<ChunkStream> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, messages = request.messages.len(), "chat_stream");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            // With stream_options.include_usage the totals arrive in a
            // usage-only chunk trailing the finish_reason chunk. Consumers
            // stop reading at finish_reason, so a finish chunk without usage
            // is held back here until the trailer can be folded into it.
            let mut pending_finish: Option<StreamChunk> = None;
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(DroverError::Stream(e.to_string()));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = parse_sse_data(&line) {
                        match serde_json::from_str::<WireChunk>(data) {
                            Ok(wire) => {
                                let chunk = wire.into_chunk();
                                if let Some(mut held) = pending_finish.take() {
                                    if is_usage_trailer(&chunk) {
                                        held.usage = chunk.usage;
                                        yield Ok(held);
                                        continue;
                                    }
                                    yield Ok(held);
                                }
                                if chunk.finish_reason.is_some() && chunk.usage.is_none() {
                                    pending_finish = Some(chunk);
                                } else {
                                    yield Ok(chunk);
                                }
                            }
                            Err(e) => {
                                yield Err(DroverError::Stream(format!(
                                    "malformed stream chunk: {e}"
                                )));
                            }
                        }
                    }
                }
            }

            if let Some(held) = pending_finish.take() {
                yield Ok(held);
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Usage-only trailer chunk: totals, no delta, no finish reason.
fn is_usage_trailer(chunk: &StreamChunk) -> bool {
    chunk.usage.is_some()
        && chunk.finish_reason.is_none()
        && chunk.delta.content.as_deref().map_or(true, str::is_empty)
        && chunk.delta.tool_calls.is_empty()
}

// -- Wire format --

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl WireChunk {
    fn into_chunk(self) -> StreamChunk {
        let usage = self.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        let choice = self.choices.into_iter().next();
        let (delta, finish_reason) = match choice {
            Some(c) => {
                let finish = c
                    .finish_reason
                    .as_deref()
                    .and_then(|s| s.parse::<FinishReason>().ok());
                (
                    StreamDelta {
                        content: c.delta.content,
                        tool_calls: c.delta.tool_calls,
                    },
                    finish,
                )
            }
            // Usage-only chunks have an empty choices array.
            None => (StreamDelta::default(), None),
        };
        StreamChunk {
            delta,
            finish_reason,
            usage,
        }
    }
}
