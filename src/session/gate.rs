//! Session state machine: the authority on whether a round may run.

use std::sync::Arc;

use tracing::debug;

use crate::error::{DroverError, Result};
use crate::store::SessionStore;
use crate::types::{Session, SessionStatus};

/// Guards the one-active-round-per-session invariant.
///
/// Transitions live in the backing store so the guarantee holds across
/// processes: `begin_processing` is an atomic check-and-set, and concurrent
/// submissions for the same session succeed exactly once.
#[derive(Clone)]
pub struct SessionGate {
    store: Arc<dyn SessionStore>,
}

impl SessionGate {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Transition idle → processing, returning the session.
    ///
    /// # Errors
    ///
    /// [`DroverError::AlreadyProcessing`] when a round is active (status is
    /// `processing` or `cancelling`); [`DroverError::SessionNotFound`] when
    /// the session does not exist.
    pub async fn begin_processing(&self, session_id: &str) -> Result<Session> {
        let swapped = self
            .store
            .compare_and_set_status(session_id, SessionStatus::Idle, SessionStatus::Processing)
            .await?;
        if !swapped {
            return Err(DroverError::AlreadyProcessing(session_id.to_string()));
        }
        debug!(session_id, "session entered processing");
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| DroverError::SessionNotFound(session_id.to_string()))
    }

    /// Request cooperative cancellation: processing → cancelling.
    ///
    /// Returns `true` when the transition happened. In-flight work is not
    /// preempted; checkpoints observe the status and wind down.
    pub async fn request_cancel(&self, session_id: &str) -> Result<bool> {
        let swapped = self
            .store
            .compare_and_set_status(
                session_id,
                SessionStatus::Processing,
                SessionStatus::Cancelling,
            )
            .await?;
        if swapped {
            debug!(session_id, "cancellation requested");
        }
        Ok(swapped)
    }

    /// Whether the session is still in `processing` (not cancelled, not
    /// finished). Checkpoints poll this before retries and new rounds.
    pub async fn is_still_processing(&self, session_id: &str) -> Result<bool> {
        let session = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| DroverError::SessionNotFound(session_id.to_string()))?;
        Ok(session.status == SessionStatus::Processing)
    }

    /// Release the session back to idle at episode end.
    pub async fn finish(&self, session_id: &str) -> Result<()> {
        self.store
            .set_status(session_id, SessionStatus::Idle)
            .await?;
        debug!(session_id, "session released to idle");
        Ok(())
    }
}
