//! Error types for Drover.

use thiserror::Error;

/// Primary error type for all Drover operations.
///
/// Recoverable outcomes (a failing tool, malformed tool arguments) are
/// represented as data on [`ToolResult`](crate::types::ToolResult) and never
/// surface here; this type covers the abort-class conditions that end a
/// round.
#[derive(Error, Debug)]
pub enum DroverError {
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {0} is already processing a round")]
    AlreadyProcessing(String),

    #[error("Session {0} is no longer active")]
    SessionNoLongerActive(String),

    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    #[error("Message {message_id} not found in session {session_id}")]
    MessageNotFound {
        session_id: String,
        message_id: String,
    },

    #[error("Insufficient balance for org {org_id}")]
    InsufficientBalance { org_id: String },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DroverError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Drives the reason stage's bounded stream retry: only transport-level
    /// failures are worth re-opening a stream for.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stream(_) | Self::Network(_) | Self::Io(_) => true,
            Self::Api { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, DroverError>;
