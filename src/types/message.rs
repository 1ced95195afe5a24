//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage::TokenUsage;

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Why the model stopped emitting.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// A tool invocation requested by the model.
///
/// `arguments` is kept as the raw accumulated string: a malformed argument
/// payload is a tool-execution concern, not a stream-protocol failure, so it
/// is carried through to the executor untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse `arguments` leniently: invalid JSON degrades to a JSON string
    /// holding the raw text, and an empty payload becomes `{}`.
    pub fn arguments_value(&self) -> serde_json::Value {
        if self.arguments.trim().is_empty() {
            return serde_json::json!({});
        }
        serde_json::from_str(&self.arguments)
            .unwrap_or_else(|_| serde_json::Value::String(self.arguments.clone()))
    }
}

/// Outcome of one tool invocation, correlated to its call by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Tokens consumed inside the executor, reconciled by the observe stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            success: true,
            data: Some(data),
            error: None,
            message: None,
            token_usage: None,
        }
    }

    /// A failed result. Failure is data, not a fault: the round proceeds.
    pub fn failure(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
            token_usage: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    /// Render the result as prompt text for the follow-up tool message.
    pub fn observation(&self) -> String {
        if self.success {
            match &self.data {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(value) => value.to_string(),
                None => self.message.clone().unwrap_or_default(),
            }
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("tool failed"))
        }
    }
}

/// Wall-clock markers for a message's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_token_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for TimingMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            first_token_at: None,
            completed_at: None,
        }
    }
}

/// A persisted conversation message.
///
/// Assistant messages are created as streaming placeholders
/// (`is_complete = false`) by the reason stage and become immutable once the
/// observe stage marks them complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
    pub is_streaming: bool,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub timing: TimingMetadata,
}

impl ChatMessage {
    /// Create a complete user message.
    pub fn user(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            is_streaming: false,
            is_complete: true,
            finish_reason: None,
            token_usage: None,
            timing: TimingMetadata::default(),
        }
    }

    /// Create the streaming assistant placeholder for a round.
    pub fn assistant_placeholder(session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            is_streaming: true,
            is_complete: false,
            finish_reason: None,
            token_usage: None,
            timing: TimingMetadata::default(),
        }
    }

    /// Create a complete assistant message (cancellation notices, errors).
    pub fn assistant(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::assistant_placeholder(session_id);
        message.content = content.into();
        message.is_streaming = false;
        message.is_complete = true;
        message.timing.completed_at = Some(Utc::now());
        message
    }

    /// Whether every requested tool call has a matching result.
    pub fn has_all_tool_results(&self) -> bool {
        self.tool_calls.iter().all(|call| {
            self.tool_results
                .iter()
                .any(|result| result.tool_call_id == call.id)
        })
    }

    /// Tool-call ids still missing a result.
    pub fn missing_result_ids(&self) -> Vec<String> {
        self.tool_calls
            .iter()
            .filter(|call| {
                !self
                    .tool_results
                    .iter()
                    .any(|result| result.tool_call_id == call.id)
            })
            .map(|call| call.id.clone())
            .collect()
    }

    /// Whether this message may enter the next round's prompt.
    ///
    /// An assistant message that requested tool calls is only usable as
    /// history once every call id has a matching result; a half-finished
    /// pair would leave the model staring at an unanswered invocation.
    /// Streaming placeholders are likewise excluded.
    pub fn is_history_eligible(&self) -> bool {
        if self.is_streaming {
            return false;
        }
        if self.role == Role::Assistant && !self.tool_calls.is_empty() {
            return self.has_all_tool_results();
        }
        true
    }

    /// Insert or overwrite the result for its tool-call id (idempotent).
    pub fn upsert_tool_result(&mut self, result: ToolResult) {
        if let Some(existing) = self
            .tool_results
            .iter_mut()
            .find(|r| r.tool_call_id == result.tool_call_id)
        {
            *existing = result;
        } else {
            self.tool_results.push(result);
        }
    }
}

/// Filter a conversation down to the messages eligible for the next prompt.
pub fn history_for_prompt(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter(|m| m.is_history_eligible())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant_with_calls(calls: &[&str]) -> ChatMessage {
        let mut message = ChatMessage::assistant_placeholder("s1");
        message.is_streaming = false;
        message.tool_calls = calls
            .iter()
            .map(|id| ToolCall::new(*id, "web_search", "{}"))
            .collect();
        message
    }

    #[test]
    fn unpaired_assistant_is_excluded_from_history() {
        let user = ChatMessage::user("s1", "search for X");
        let mut assistant = assistant_with_calls(&["call_1", "call_2"]);
        assistant.upsert_tool_result(ToolResult::ok(
            "call_1",
            "web_search",
            serde_json::json!([]),
        ));

        let history = history_for_prompt(&[user.clone(), assistant.clone()]);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);

        assistant.upsert_tool_result(ToolResult::ok(
            "call_2",
            "web_search",
            serde_json::json!([]),
        ));
        let history = history_for_prompt(&[user, assistant]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn streaming_placeholder_is_excluded() {
        let placeholder = ChatMessage::assistant_placeholder("s1");
        assert!(!placeholder.is_history_eligible());
    }

    #[test]
    fn upsert_overwrites_by_call_id() {
        let mut message = assistant_with_calls(&["call_1"]);
        message.upsert_tool_result(ToolResult::ok(
            "call_1",
            "web_search",
            serde_json::json!("first"),
        ));
        message.upsert_tool_result(ToolResult::ok(
            "call_1",
            "web_search",
            serde_json::json!("second"),
        ));

        assert_eq!(message.tool_results.len(), 1);
        assert_eq!(
            message.tool_results[0].data,
            Some(serde_json::json!("second"))
        );
    }

    #[test]
    fn missing_result_ids_reports_uncovered_calls() {
        let mut message = assistant_with_calls(&["a", "b", "c"]);
        message.upsert_tool_result(ToolResult::ok("b", "web_search", serde_json::json!(null)));
        assert_eq!(message.missing_result_ids(), vec!["a", "c"]);
    }

    #[test]
    fn arguments_value_degrades_to_raw_string() {
        let call = ToolCall::new("c1", "search", "{not json");
        assert_eq!(
            call.arguments_value(),
            serde_json::Value::String("{not json".into())
        );

        let empty = ToolCall::new("c2", "search", "");
        assert_eq!(empty.arguments_value(), serde_json::json!({}));

        let valid = ToolCall::new("c3", "search", r#"{"q":"rust"}"#);
        assert_eq!(valid.arguments_value(), serde_json::json!({"q": "rust"}));
    }

    #[test]
    fn observation_renders_error_for_failures() {
        let result = ToolResult::failure("c1", "web_search", "boom");
        assert_eq!(result.observation(), "Error: boom");
    }
}
