//! Builtin tools.

use async_trait::async_trait;

use super::tool::{ToolCtx, ToolExecutor, ToolOutcome};
use crate::error::Result;
use crate::types::ToolResult;

/// Terminal tool: the model calls `complete` to end the episode.
///
/// Execution sets the session's completion signal; the observe stage
/// consumes it and stops the loop instead of starting another round.
#[derive(Debug, Default)]
pub struct CompleteTool;

pub const COMPLETE_TOOL_NAME: &str = "complete";

#[async_trait]
impl ToolExecutor for CompleteTool {
    fn name(&self) -> &str {
        COMPLETE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Finish the current task. Call this when the user's request has been fully handled."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "One-sentence summary of what was accomplished."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolCtx) -> Result<ToolOutcome> {
        ctx.signal_completion(COMPLETE_TOOL_NAME, args.clone()).await?;
        Ok(ToolOutcome::Completed(
            ToolResult::ok(ctx.tool_call_id.clone(), COMPLETE_TOOL_NAME, args)
                .with_message("task marked complete"),
        ))
    }
}
