//! Session and episode-level types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a session.
///
/// `Cancelling` is cooperative: in-flight work is not preempted, the next
/// checkpoint observes the status and winds the round down.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Processing,
    Cancelling,
}

/// A conversation session. At most one round is active per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub agent_id: String,
    pub model_id: String,
    pub org_id: String,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        model_id: impl Into<String>,
        org_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            status: SessionStatus::Idle,
            agent_id: agent_id.into(),
            model_id: model_id.into(),
            org_id: org_id.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Out-of-band marker set by a terminal tool to end an episode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionSignal {
    pub session_id: String,
    pub signal_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Why an episode stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The model answered without requesting tools.
    PlainReply,
    /// A terminal tool signalled completion.
    Completed(CompletionSignal),
    /// The round cap was reached; termination was forced.
    IterationCap,
}

/// Terminal outcome of driving an episode (or a resumed slice of one).
#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeOutcome {
    Completed {
        reason: StopReason,
        last_message_id: Uuid,
    },
    /// The round is awaiting remote tool results and has been persisted;
    /// delivery through the resume entry point picks it back up.
    Paused {
        message_id: Uuid,
        awaiting: Vec<String>,
    },
    Cancelled,
}
