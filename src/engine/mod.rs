//! The workflow orchestrator: prepare → {reason → act → observe}* → finish.

mod act;
mod observe;
mod reason;

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::billing::BillingLedger;
use crate::client::ModelClient;
use crate::config::EngineConfig;
use crate::error::{DroverError, Result};
use crate::push::{PushChannel, SessionEvent};
use crate::session::{ActiveSession, ActiveSessions, IterationCounter, SessionGate};
use crate::store::{keys, KvStore, MessageStore, SessionStore};
use crate::tools::ToolRegistry;
use crate::types::{ChatMessage, EpisodeOutcome, Session, SessionStatus, StopReason, ToolResult};

use self::act::ActOutcome;
use self::observe::ObserveDecision;

const CANCELLED_NOTICE: &str = "Generation was cancelled.";
const STUCK_NUDGE: &str = "Observed duplicate responses. Consider new strategies and avoid \
                           repeating ineffective paths already attempted.";

/// External collaborators the engine is wired to.
pub struct EngineDeps {
    pub client: Arc<dyn ModelClient>,
    pub tools: Arc<ToolRegistry>,
    pub sessions: Arc<dyn SessionStore>,
    pub messages: Arc<dyn MessageStore>,
    pub kv: Arc<dyn KvStore>,
    pub ledger: Arc<dyn BillingLedger>,
    pub push: Arc<dyn PushChannel>,
}

/// A new user message for a session.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub session_id: String,
    pub text: String,
    pub agent_id: String,
    /// Model for a session created by this message; existing sessions keep
    /// their own.
    pub model_id: Option<String>,
    pub org_id: String,
}

impl SubmitRequest {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            agent_id: "default".to_string(),
            model_id: None,
            org_id: "default".to_string(),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = org_id.into();
        self
    }
}

/// Result of delivering remote tool results to a paused round.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// Some awaited tool calls are still uncovered.
    AwaitingMore { remaining: Vec<String> },
    /// The awaiting set was covered; the round ran on from the observe
    /// stage and ended in this outcome.
    Resumed(EpisodeOutcome),
}

/// Drives agent rounds for sessions: streams the model, executes tools,
/// persists every step so paused rounds survive restarts, and settles
/// billing exactly once per round.
///
/// One `Engine` serves many sessions concurrently; the session gate keeps
/// each session to a single active round.
pub struct Engine {
    config: EngineConfig,
    client: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    gate: SessionGate,
    messages: Arc<dyn MessageStore>,
    kv: Arc<dyn KvStore>,
    ledger: Arc<dyn BillingLedger>,
    push: Arc<dyn PushChannel>,
    active: ActiveSessions,
    counter: IterationCounter,
}

impl Engine {
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        let counter = IterationCounter::new(deps.kv.clone(), config.iteration_ttl);
        Self {
            gate: SessionGate::new(deps.sessions),
            client: deps.client,
            tools: deps.tools,
            messages: deps.messages,
            kv: deps.kv,
            ledger: deps.ledger,
            push: deps.push,
            active: ActiveSessions::new(),
            counter,
            config,
        }
    }

    /// Handle a new user message: run the episode to a terminal outcome or
    /// a pause.
    ///
    /// # Errors
    ///
    /// [`DroverError::AlreadyProcessing`] when a round is already active for
    /// the session; [`DroverError::InsufficientBalance`] before any round
    /// starts when the pre-flight check fails. Any abort-class stage failure
    /// is returned after the session has been released and an error notice
    /// persisted.
    pub async fn submit(&self, request: SubmitRequest) -> Result<EpisodeOutcome> {
        let session = self.prepare(&request).await?;
        let handle = self.active.activate(&session.id);

        info!(
            session_id = %session.id,
            model = %session.model_id,
            "episode started"
        );
        match self.drive_rounds(&session, &handle).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.fail_episode(&session, &err).await;
                Err(err)
            }
        }
    }

    /// Deliver remote tool results to a paused round (the inbound resume
    /// contract). When the awaiting set becomes fully covered, the round
    /// re-enters the observe stage and the loop continues from there.
    pub async fn resume(
        &self,
        session_id: &str,
        message_id: Uuid,
        results: Vec<ToolResult>,
    ) -> Result<ResumeOutcome> {
        let session = self
            .gate
            .store()
            .get(session_id)
            .await?
            .ok_or_else(|| DroverError::SessionNotFound(session_id.to_string()))?;

        let awaiting_key = keys::awaiting(session_id, message_id);

        // A cancellation requested while the round was paused is honored at
        // this checkpoint: late deliveries are dropped and the episode winds
        // down even if the awaiting record has already expired.
        if session.status == SessionStatus::Cancelling {
            self.kv.del(&awaiting_key).await?;
            let outcome = self.finish_cancelled(&session).await?;
            return Ok(ResumeOutcome::Resumed(outcome));
        }

        let raw = self.kv.get(&awaiting_key).await?.ok_or_else(|| {
            DroverError::InvalidSessionState(format!(
                "no paused round awaiting results for message {message_id}"
            ))
        })?;
        let mut awaiting: BTreeSet<String> = serde_json::from_str(&raw)?;

        for result in results {
            let known = self
                .messages
                .get(session_id, message_id)
                .await?
                .map(|m| m.tool_calls.iter().any(|c| c.id == result.tool_call_id))
                .unwrap_or(false);
            if !known {
                warn!(
                    session_id,
                    tool_call_id = %result.tool_call_id,
                    "discarding delivered result for unknown tool call"
                );
                continue;
            }
            self.messages
                .upsert_tool_result(session_id, message_id, &result)
                .await?;
            awaiting.remove(&result.tool_call_id);
            self.push
                .emit(SessionEvent::ToolResultReady {
                    session_id: session_id.to_string(),
                    message_id,
                    result,
                })
                .await;
        }

        if !awaiting.is_empty() {
            self.kv
                .set(
                    &awaiting_key,
                    &serde_json::to_string(&awaiting)?,
                    Some(self.config.state_ttl),
                )
                .await?;
            let remaining: Vec<String> = awaiting.into_iter().collect();
            debug!(
                session_id,
                %message_id,
                remaining = remaining.len(),
                "partial delivery; round stays paused"
            );
            return Ok(ResumeOutcome::AwaitingMore { remaining });
        }
        self.kv.del(&awaiting_key).await?;

        if !self.gate.is_still_processing(session_id).await? {
            // Cancelled (or torn down) while paused; wind the episode down.
            let outcome = self.finish_cancelled(&session).await?;
            return Ok(ResumeOutcome::Resumed(outcome));
        }

        info!(session_id, %message_id, "paused round fully covered; resuming");
        let handle = self.active.activate(session_id);
        let run = async {
            match self.observe_round(&session, message_id).await? {
                ObserveDecision::Stop(reason) => {
                    self.finish_completed(&session, reason, message_id).await
                }
                ObserveDecision::Continue => self.drive_rounds(&session, &handle).await,
            }
        };
        match run.await {
            Ok(outcome) => Ok(ResumeOutcome::Resumed(outcome)),
            Err(err) => {
                self.fail_episode(&session, &err).await;
                Err(err)
            }
        }
    }

    /// Request cooperative cancellation of the session's active round.
    ///
    /// Returns `true` when the durable state moved to `cancelling`. In-flight
    /// work is not interrupted; the next checkpoint halts the loop and a
    /// cancellation notice is appended.
    pub async fn cancel(&self, session_id: &str) -> Result<bool> {
        let transitioned = self.gate.request_cancel(session_id).await?;
        self.active.cancel(session_id);
        Ok(transitioned)
    }

    /// Session gate, exposed for embedding layers that route status queries.
    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    // -- Episode internals --

    /// Load-or-create the session, pre-check balance, flip to processing,
    /// and persist the user message.
    async fn prepare(&self, request: &SubmitRequest) -> Result<Session> {
        let session = match self.gate.store().get(&request.session_id).await? {
            Some(session) => session,
            None => {
                let session = Session::new(
                    &request.session_id,
                    &request.agent_id,
                    request
                        .model_id
                        .clone()
                        .unwrap_or_else(|| self.config.default_model.clone()),
                    &request.org_id,
                );
                self.gate.store().put(&session).await?;
                debug!(session_id = %session.id, "session created on first message");
                session
            }
        };

        // Balance is checked before the model is ever invoked; a broke org
        // never starts a round.
        let estimate = self
            .ledger
            .estimate_cost(&session.model_id, &self.config.preflight_usage);
        if !self.ledger.check_balance(&session.org_id, &estimate).await? {
            return Err(DroverError::InsufficientBalance {
                org_id: session.org_id,
            });
        }

        let session = self.gate.begin_processing(&session.id).await?;
        self.messages
            .insert(&ChatMessage::user(&session.id, &request.text))
            .await?;
        Ok(session)
    }

    /// The round loop. Every iteration re-checks cancellation before the
    /// reason stage; stage failures bubble out to the caller's catch point.
    async fn drive_rounds(
        &self,
        session: &Session,
        handle: &ActiveSession,
    ) -> Result<EpisodeOutcome> {
        let mut last_reply: Option<String> = None;
        let mut repeats: u32 = 0;

        loop {
            if handle.cancel.is_cancelled() || !self.gate.is_still_processing(&session.id).await? {
                return self.finish_cancelled(session).await;
            }

            let round = self.counter.current(&session.id).await? + 1;
            self.push
                .emit(SessionEvent::RoundStarted {
                    session_id: session.id.clone(),
                    round,
                })
                .await;

            let reason = match self.reason_stage(session, handle).await {
                Ok(output) => output,
                Err(DroverError::SessionNoLongerActive(_)) => {
                    return self.finish_cancelled(session).await;
                }
                Err(err) => return Err(err),
            };

            // Stuck detection: identical consecutive replies earn a strategy
            // nudge in the next prompt.
            if !reason.content.is_empty() {
                if last_reply.as_deref() == Some(reason.content.as_str()) {
                    repeats += 1;
                } else {
                    repeats = 0;
                    last_reply = Some(reason.content.clone());
                }
                if repeats >= self.config.stuck_threshold {
                    warn!(session_id = %session.id, repeats, "duplicate replies detected; nudging");
                    self.messages
                        .insert(&ChatMessage::user(&session.id, STUCK_NUDGE))
                        .await?;
                    repeats = 0;
                }
            }

            if reason.tool_calls.is_empty() {
                let decision = self.observe_round(session, reason.message_id).await?;
                let stop = match decision {
                    ObserveDecision::Stop(reason) => reason,
                    // A round without tool calls always terminates.
                    ObserveDecision::Continue => StopReason::PlainReply,
                };
                return self.finish_completed(session, stop, reason.message_id).await;
            }

            match self
                .act_stage(session, reason.message_id, &reason.tool_calls)
                .await?
            {
                ActOutcome::Paused { awaiting } => {
                    self.push
                        .emit(SessionEvent::EpisodePaused {
                            session_id: session.id.clone(),
                            message_id: reason.message_id,
                            awaiting: awaiting.clone(),
                        })
                        .await;
                    // In-process state is torn down; the durable pause
                    // record is what a future resume (or another process)
                    // picks up.
                    self.active.deactivate(&session.id);
                    return Ok(EpisodeOutcome::Paused {
                        message_id: reason.message_id,
                        awaiting,
                    });
                }
                ActOutcome::Completed(_) => {
                    match self.observe_round(session, reason.message_id).await? {
                        ObserveDecision::Continue => continue,
                        ObserveDecision::Stop(stop) => {
                            return self
                                .finish_completed(session, stop, reason.message_id)
                                .await;
                        }
                    }
                }
            }
        }
    }

    async fn finish_completed(
        &self,
        session: &Session,
        reason: StopReason,
        last_message_id: Uuid,
    ) -> Result<EpisodeOutcome> {
        self.cleanup_episode(&session.id).await?;
        self.push
            .emit(SessionEvent::EpisodeCompleted {
                session_id: session.id.clone(),
            })
            .await;
        info!(session_id = %session.id, ?reason, "episode completed");
        Ok(EpisodeOutcome::Completed {
            reason,
            last_message_id,
        })
    }

    async fn finish_cancelled(&self, session: &Session) -> Result<EpisodeOutcome> {
        self.messages
            .insert(&ChatMessage::assistant(&session.id, CANCELLED_NOTICE))
            .await?;
        self.cleanup_episode(&session.id).await?;
        self.push
            .emit(SessionEvent::EpisodeCancelled {
                session_id: session.id.clone(),
            })
            .await;
        info!(session_id = %session.id, "episode cancelled");
        Ok(EpisodeOutcome::Cancelled)
    }

    /// Single catch point for abort-class failures: persist an error notice,
    /// release the session, and leave the conversation consistent. All
    /// best-effort — the original error is what the caller sees.
    async fn fail_episode(&self, session: &Session, err: &DroverError) {
        error!(session_id = %session.id, error = %err, "episode failed");
        let notice = ChatMessage::assistant(
            &session.id,
            format!("The run ended with an error: {err}"),
        );
        if let Err(persist_err) = self.messages.insert(&notice).await {
            error!(session_id = %session.id, error = %persist_err, "failed to persist error notice");
        }
        if let Err(cleanup_err) = self.cleanup_episode(&session.id).await {
            error!(session_id = %session.id, error = %cleanup_err, "episode cleanup failed");
        }
        self.push
            .emit(SessionEvent::EpisodeErrored {
                session_id: session.id.clone(),
                error: err.to_string(),
            })
            .await;
    }

    /// Episode-end teardown: reset the round counter, drop any unconsumed
    /// completion signal, release the session, tear down in-process state.
    async fn cleanup_episode(&self, session_id: &str) -> Result<()> {
        self.counter.reset(session_id).await?;
        self.kv.del(&keys::completion_signal(session_id)).await?;
        self.gate.finish(session_id).await?;
        self.active.deactivate(session_id);
        Ok(())
    }
}
