//! Tool executor trait, execution context, and the closure-based wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{DroverError, Result};
use crate::store::{keys, KvStore};
use crate::types::{CompletionSignal, ToolResult};

/// What a tool execution produced.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// The tool ran to completion in-process.
    Completed(ToolResult),
    /// The tool handed work to a remote executor; the round pauses until
    /// the result is delivered through the resume entry point.
    Pending,
}

/// Context available to a tool while it executes.
#[derive(Clone)]
pub struct ToolCtx {
    pub session_id: String,
    pub message_id: Uuid,
    pub tool_call_id: String,
    kv: Arc<dyn KvStore>,
    signal_ttl: std::time::Duration,
}

impl ToolCtx {
    pub fn new(
        session_id: impl Into<String>,
        message_id: Uuid,
        tool_call_id: impl Into<String>,
        kv: Arc<dyn KvStore>,
        signal_ttl: std::time::Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            message_id,
            tool_call_id: tool_call_id.into(),
            kv,
            signal_ttl,
        }
    }

    /// Mark the episode as done: the observe stage consumes the signal and
    /// terminates instead of starting another round.
    pub async fn signal_completion(
        &self,
        signal_type: impl Into<String>,
        params: serde_json::Value,
    ) -> Result<()> {
        let signal = CompletionSignal {
            session_id: self.session_id.clone(),
            signal_type: signal_type.into(),
            params,
        };
        let payload = serde_json::to_string(&signal)?;
        self.kv
            .set(
                &keys::completion_signal(&self.session_id),
                &payload,
                Some(self.signal_ttl),
            )
            .await
    }
}

impl std::fmt::Debug for ToolCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCtx")
            .field("session_id", &self.session_id)
            .field("message_id", &self.message_id)
            .field("tool_call_id", &self.tool_call_id)
            .finish()
    }
}

/// Capability interface implemented by every tool.
///
/// `execute` receives the leniently parsed arguments (malformed JSON arrives
/// as a JSON string holding the raw text) and owns its own validation. An
/// `Err` return is converted by the act stage into a failed [`ToolResult`];
/// it never aborts the round.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments.
    fn parameters(&self) -> serde_json::Value;

    async fn execute(&self, args: serde_json::Value, ctx: &ToolCtx) -> Result<ToolOutcome>;
}

type FnToolHandler = dyn Fn(serde_json::Value, ToolCtx) -> Pin<Box<dyn Future<Output = Result<ToolOutcome>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick registration.
pub struct FnTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
    handler: Arc<FnToolHandler>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value, ToolCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutcome>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl ToolExecutor for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolCtx) -> Result<ToolOutcome> {
        (self.handler)(args, ctx.clone()).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// A capability hosted by a remote executor (e.g. a browser-side tool).
///
/// Executing it only records that work is pending; the actual result arrives
/// later through the resume endpoint, correlated by tool-call id.
#[derive(Debug, Clone)]
pub struct RemoteTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl RemoteTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[async_trait]
impl ToolExecutor for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    async fn execute(&self, _args: serde_json::Value, _ctx: &ToolCtx) -> Result<ToolOutcome> {
        Ok(ToolOutcome::Pending)
    }
}

/// Helper for executors that want typed arguments.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: &serde_json::Value) -> Result<T> {
    serde_json::from_value(args.clone()).map_err(DroverError::from)
}
