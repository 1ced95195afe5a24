//! Reason stage: stream the model, accumulate text and tool calls.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::time::{self, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use super::Engine;
use crate::accumulate::ToolCallAccumulator;
use crate::client::ChatStreamRequest;
use crate::error::{DroverError, Result};
use crate::push::{Debouncer, SessionEvent};
use crate::session::ActiveSession;
use crate::types::{
    history_for_prompt, ChatMessage, FinishReason, Session, TokenUsage, ToolCall,
};

/// What one reason stage produced.
#[derive(Debug, Clone)]
pub(crate) struct ReasonOutput {
    pub message_id: Uuid,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: TokenUsage,
}

#[derive(Debug)]
struct StreamAttempt {
    content: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: TokenUsage,
    first_token_at: Option<DateTime<Utc>>,
}

impl Engine {
    /// Run one reason stage for the session's current round.
    ///
    /// Persists the streaming placeholder up front and finalizes it from the
    /// attempt that succeeds. Transient stream failures are retried on a
    /// fresh stream with a fixed delay; each retry discards the failed
    /// attempt's partial accumulation and announces the retraction on the
    /// push channel. Cancellation is checked before every retry, never
    /// mid-stream.
    pub(crate) async fn reason_stage(
        &self,
        session: &Session,
        handle: &ActiveSession,
    ) -> Result<ReasonOutput> {
        let history = self.messages.history(&session.id).await?;
        let request = ChatStreamRequest::new(&session.model_id, history_for_prompt(&history))
            .with_tools(self.tools.schemas());

        let mut placeholder = ChatMessage::assistant_placeholder(&session.id);
        self.messages.insert(&placeholder).await?;
        let message_id = placeholder.id;

        let mut last_err: Option<DroverError> = None;
        for attempt in 1..=self.config.max_stream_retries {
            if attempt > 1 {
                if handle.cancel.is_cancelled()
                    || !self.gate.is_still_processing(&session.id).await?
                {
                    return Err(DroverError::SessionNoLongerActive(session.id.clone()));
                }
                self.push
                    .emit(SessionEvent::ContentRetracted {
                        session_id: session.id.clone(),
                        message_id,
                    })
                    .await;
                time::sleep(self.config.stream_retry_delay).await;
            }

            match self.stream_attempt(session, &request, message_id).await {
                Ok(outcome) => {
                    placeholder.content = outcome.content.clone();
                    placeholder.tool_calls = outcome.tool_calls.clone();
                    placeholder.finish_reason = outcome.finish_reason;
                    placeholder.token_usage = Some(outcome.usage);
                    placeholder.is_streaming = false;
                    placeholder.timing.first_token_at = outcome.first_token_at;
                    self.messages.update(&placeholder).await?;

                    debug!(
                        session_id = %session.id,
                        %message_id,
                        attempt,
                        tool_calls = outcome.tool_calls.len(),
                        content_len = outcome.content.len(),
                        "reason stage complete"
                    );
                    return Ok(ReasonOutput {
                        message_id,
                        content: outcome.content,
                        tool_calls: outcome.tool_calls,
                        finish_reason: outcome.finish_reason,
                        usage: outcome.usage,
                    });
                }
                Err(err) if err.is_retryable() => {
                    warn!(
                        session_id = %session.id,
                        attempt,
                        max_attempts = self.config.max_stream_retries,
                        error = %err,
                        "model stream failed; will retry on a fresh stream"
                    );
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| DroverError::Stream("stream attempts exhausted".into())))
    }

    /// One stream attempt: consume chunks until `finish_reason`, stream end,
    /// or a timeout. The overall deadline is independent of the per-chunk
    /// idle budget.
    async fn stream_attempt(
        &self,
        session: &Session,
        request: &ChatStreamRequest,
        message_id: Uuid,
    ) -> Result<StreamAttempt> {
        let mut stream = self.client.chat_stream(request).await?;

        let mut content = String::new();
        let mut accumulator = ToolCallAccumulator::new();
        let mut usage = TokenUsage::default();
        let mut finish_reason: Option<FinishReason> = None;
        let mut first_token_at: Option<DateTime<Utc>> = None;
        let mut debouncer = Debouncer::new(self.config.push_debounce);

        let deadline = Instant::now() + self.config.stream_timeout;
        let idle = self.config.stream_idle_timeout;
        let mut idle_sleep = Box::pin(time::sleep(idle));

        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => {
                    return Err(DroverError::Timeout(
                        self.config.stream_timeout.as_millis() as u64,
                    ));
                }
                _ = idle_sleep.as_mut() => {
                    return Err(DroverError::Stream(format!(
                        "no chunk received for {}ms",
                        idle.as_millis()
                    )));
                }
                chunk = stream.next() => {
                    let Some(chunk) = chunk else { break; };
                    let chunk = chunk?;
                    idle_sleep.as_mut().reset(Instant::now() + idle);

                    if let Some(text) = chunk.delta.content {
                        if !text.is_empty() {
                            if first_token_at.is_none() {
                                first_token_at = Some(Utc::now());
                            }
                            content.push_str(&text);
                            if let Some(flush) = debouncer.push(&text) {
                                self.push
                                    .emit(SessionEvent::ContentDelta {
                                        session_id: session.id.clone(),
                                        message_id,
                                        text: flush,
                                    })
                                    .await;
                            }
                        }
                    }
                    for delta in &chunk.delta.tool_calls {
                        if first_token_at.is_none() {
                            first_token_at = Some(Utc::now());
                        }
                        accumulator.apply(delta);
                    }
                    if let Some(u) = chunk.usage {
                        usage = u;
                    }
                    if let Some(reason) = chunk.finish_reason {
                        finish_reason = Some(reason);
                        break;
                    }
                }
            }
        }

        if let Some(flush) = debouncer.flush() {
            self.push
                .emit(SessionEvent::ContentDelta {
                    session_id: session.id.clone(),
                    message_id,
                    text: flush,
                })
                .await;
        }

        Ok(StreamAttempt {
            content,
            tool_calls: accumulator.finish(),
            finish_reason,
            usage,
            first_token_at,
        })
    }
}
