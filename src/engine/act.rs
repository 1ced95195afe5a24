//! Act stage: dispatch accumulated tool calls, pausing on remote work.

use std::collections::BTreeSet;

use tracing::{debug, warn};
use uuid::Uuid;

use super::Engine;
use crate::error::Result;
use crate::push::SessionEvent;
use crate::store::keys;
use crate::tools::{ToolCtx, ToolOutcome};
use crate::types::{Session, ToolCall, ToolResult};

/// What the act stage produced for a round.
#[derive(Debug)]
pub(crate) enum ActOutcome {
    /// Every call ran in-process; results are persisted.
    Completed(Vec<ToolResult>),
    /// One or more calls went to a remote executor. The awaiting id set is
    /// persisted; the round stays suspended until resume covers it.
    Paused { awaiting: Vec<String> },
}

impl Engine {
    /// Execute the round's tool calls in order.
    ///
    /// An executor failure or an unknown tool name becomes a failed
    /// [`ToolResult`] — data, not a fault — and the round still proceeds to
    /// the observe stage.
    pub(crate) async fn act_stage(
        &self,
        session: &Session,
        message_id: Uuid,
        calls: &[ToolCall],
    ) -> Result<ActOutcome> {
        let mut results = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for call in calls {
            self.push
                .emit(SessionEvent::ToolCallStarted {
                    session_id: session.id.clone(),
                    message_id,
                    call: call.clone(),
                })
                .await;

            let outcome = match self.tools.resolve(&call.name) {
                None => {
                    warn!(session_id = %session.id, tool = %call.name, "unknown tool requested");
                    ToolOutcome::Completed(ToolResult::failure(
                        &call.id,
                        &call.name,
                        format!("unknown tool '{}'", call.name),
                    ))
                }
                Some(tool) => {
                    let ctx = ToolCtx::new(
                        &session.id,
                        message_id,
                        &call.id,
                        self.kv.clone(),
                        self.config.state_ttl,
                    );
                    match tool.execute(call.arguments_value(), &ctx).await {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            warn!(
                                session_id = %session.id,
                                tool = %call.name,
                                error = %err,
                                "tool execution failed"
                            );
                            ToolOutcome::Completed(ToolResult::failure(
                                &call.id,
                                &call.name,
                                err.to_string(),
                            ))
                        }
                    }
                }
            };

            match outcome {
                ToolOutcome::Completed(mut result) => {
                    truncate_observation(&mut result, self.config.max_observe);
                    self.messages
                        .upsert_tool_result(&session.id, message_id, &result)
                        .await?;
                    self.push
                        .emit(SessionEvent::ToolResultReady {
                            session_id: session.id.clone(),
                            message_id,
                            result: result.clone(),
                        })
                        .await;
                    results.push(result);
                }
                ToolOutcome::Pending => pending.push(call.id.clone()),
            }
        }

        if pending.is_empty() {
            return Ok(ActOutcome::Completed(results));
        }

        // Phase one of the pause protocol: the awaiting set must be durable
        // before the round reports itself paused.
        let awaiting: BTreeSet<&str> = pending.iter().map(String::as_str).collect();
        self.kv
            .set(
                &keys::awaiting(&session.id, message_id),
                &serde_json::to_string(&awaiting)?,
                Some(self.config.state_ttl),
            )
            .await?;

        debug!(
            session_id = %session.id,
            %message_id,
            awaiting = pending.len(),
            "round paused awaiting remote tool results"
        );
        Ok(ActOutcome::Paused { awaiting: pending })
    }
}

/// Cap what the result feeds into the next prompt at the configured byte
/// budget.
///
/// The bound applies to the rendered observation, whatever shape the
/// executor returned: an oversized array/object payload or message collapses
/// to its truncated rendering, and failure text is clipped so the rendered
/// error line fits the same budget.
fn truncate_observation(result: &mut ToolResult, max_observe: usize) {
    if max_observe == 0 {
        return;
    }
    if result.success {
        let rendered = result.observation();
        if rendered.len() > max_observe {
            let clipped = truncate_at_boundary(&rendered, max_observe).to_string();
            result.data = Some(serde_json::Value::String(clipped));
            result.message = None;
        }
    } else if let Some(error) = result.error.take() {
        let budget = max_observe.saturating_sub("Error: ".len());
        result.error = Some(truncate_at_boundary(&error, budget).to_string());
    }
}

/// Cut at the largest char boundary not past `max`.
fn truncate_at_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut result = ToolResult::ok("c1", "t", serde_json::json!("héllo wörld"));
        truncate_observation(&mut result, 3);
        let text = result.data.as_ref().unwrap().as_str().unwrap();
        assert!(text.len() <= 3);
        assert_eq!(text, "h\u{e9}");
    }

    #[test]
    fn short_payloads_are_untouched() {
        let mut short = ToolResult::ok("c1", "t", serde_json::json!("ok"));
        truncate_observation(&mut short, 100);
        assert_eq!(short.data, Some(serde_json::json!("ok")));

        let mut object = ToolResult::ok("c2", "t", serde_json::json!({"k": "v"}));
        truncate_observation(&mut object, 100);
        assert_eq!(object.data, Some(serde_json::json!({"k": "v"})));
    }

    #[test]
    fn oversized_structured_payload_collapses_to_clipped_rendering() {
        let mut result = ToolResult::ok(
            "c1",
            "t",
            serde_json::json!([{"url": "https://example.com", "title": "a very long hit"}]),
        );
        let rendered = result.observation();
        truncate_observation(&mut result, 16);

        assert_eq!(
            result.data,
            Some(serde_json::Value::String(rendered[..16].to_string()))
        );
        assert!(result.observation().len() <= 16);
    }

    #[test]
    fn oversized_message_only_result_is_bounded() {
        let mut result = ToolResult::ok("c1", "t", serde_json::Value::Null);
        result.data = None;
        result.message = Some("x".repeat(64));
        truncate_observation(&mut result, 10);

        assert_eq!(result.observation(), "x".repeat(10));
        assert_eq!(result.message, None);
    }

    #[test]
    fn failure_error_line_fits_the_budget() {
        let mut result = ToolResult::failure("c1", "t", "y".repeat(64));
        truncate_observation(&mut result, 20);

        assert_eq!(result.error.as_deref(), Some("y".repeat(13).as_str()));
        assert!(result.observation().len() <= 20);
    }
}
