//! Observe stage: reconcile usage, bill, and decide continuation.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Engine;
use crate::billing::deduct_logged;
use crate::error::{DroverError, Result};
use crate::store::keys;
use crate::types::{CompletionSignal, Session, StopReason};

/// Continuation decision for the round just observed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ObserveDecision {
    /// Start another round.
    Continue,
    /// The episode ends here.
    Stop(StopReason),
}

impl Engine {
    /// Close out a round whose results are all present.
    ///
    /// Marks the assistant message complete (it becomes immutable), settles
    /// token accounting, and decides whether the loop runs again. Rounds
    /// that requested tools consume one iteration; a plain reply terminates
    /// without touching the counter.
    pub(crate) async fn observe_round(
        &self,
        session: &Session,
        message_id: Uuid,
    ) -> Result<ObserveDecision> {
        let mut message = self
            .messages
            .get(&session.id, message_id)
            .await?
            .ok_or_else(|| DroverError::MessageNotFound {
                session_id: session.id.clone(),
                message_id: message_id.to_string(),
            })?;

        // Reconcile: reason-stage tokens plus whatever the executors burned.
        let mut usage = message.token_usage.unwrap_or_default();
        for result in &message.tool_results {
            if let Some(executor_usage) = result.token_usage {
                usage.merge(&executor_usage);
            }
        }
        message.token_usage = Some(usage);

        let cost = self.ledger.estimate_cost(&session.model_id, &usage);
        deduct_logged(self.ledger.as_ref(), &session.org_id, &cost).await;

        message.is_complete = true;
        message.is_streaming = false;
        message.timing.completed_at = Some(Utc::now());
        self.messages.update(&message).await?;

        if message.tool_calls.is_empty() {
            debug!(session_id = %session.id, %message_id, "plain reply; episode ends");
            return Ok(ObserveDecision::Stop(StopReason::PlainReply));
        }

        let rounds = self.counter.increment(&session.id).await?;

        if let Some(signal) = self.take_completion_signal(&session.id).await? {
            info!(
                session_id = %session.id,
                signal_type = %signal.signal_type,
                rounds,
                "completion signalled; episode ends"
            );
            return Ok(ObserveDecision::Stop(StopReason::Completed(signal)));
        }

        if rounds >= self.config.max_iterations {
            warn!(
                session_id = %session.id,
                rounds,
                cap = self.config.max_iterations,
                "iteration cap reached; forcing termination"
            );
            return Ok(ObserveDecision::Stop(StopReason::IterationCap));
        }

        debug!(session_id = %session.id, rounds, "round observed; continuing");
        Ok(ObserveDecision::Continue)
    }

    /// Consume-and-clear the session's completion signal, if set.
    pub(crate) async fn take_completion_signal(
        &self,
        session_id: &str,
    ) -> Result<Option<CompletionSignal>> {
        let key = keys::completion_signal(session_id);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        self.kv.del(&key).await?;
        match serde_json::from_str(&raw) {
            Ok(signal) => Ok(Some(signal)),
            Err(err) => {
                warn!(session_id, error = %err, "discarding malformed completion signal");
                Ok(None)
            }
        }
    }
}
