//! Pause/resume protocol tests: delivery, idempotency, restarts.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{text_round, tool_round, Harness, ScriptedCall};
use drover::engine::{ResumeOutcome, SubmitRequest};
use drover::error::DroverError;
use drover::store::{MessageStore, SessionStore};
use drover::tools::{RemoteTool, ToolRegistry};
use drover::types::{EpisodeOutcome, Role, SessionStatus, StopReason, ToolResult};

fn remote_registry() -> ToolRegistry {
    ToolRegistry::new().with(Arc::new(RemoteTool::new(
        "browser_fetch",
        "Fetch a page in the user's browser",
        serde_json::json!({"type": "object", "properties": {"url": {"type": "string"}}}),
    )))
}

/// Two remote calls in one round, each in its own slot.
fn double_remote_round() -> Vec<drover::error::Result<drover::types::StreamChunk>> {
    let delta = |index: usize, id: &str, url: &str| {
        Ok(serde_json::from_value(serde_json::json!({
            "delta": {
                "tool_calls": [{
                    "index": index,
                    "id": id,
                    "function": {"name": "browser_fetch", "arguments": format!("{{\"url\":\"{url}\"}}")}
                }]
            }
        }))
        .unwrap())
    };
    vec![
        delta(0, "call_a", "a"),
        delta(1, "call_b", "b"),
        Ok(drover::types::StreamChunk::finish(
            drover::types::FinishReason::ToolCalls,
            Some(drover::types::TokenUsage::new(10, 5)),
        )),
    ]
}

#[tokio::test]
async fn partial_delivery_keeps_the_round_paused() {
    let harness = Harness::new(
        vec![
            ScriptedCall::Chunks(double_remote_round()),
            ScriptedCall::Chunks(text_round("Both pages fetched.")),
        ],
        remote_registry(),
    );

    let outcome = harness
        .engine
        .submit(SubmitRequest::new("s1", "fetch both"))
        .await
        .unwrap();
    let EpisodeOutcome::Paused { message_id, awaiting } = outcome else {
        panic!("expected pause");
    };
    assert_eq!(awaiting.len(), 2);

    // First delivery covers one of two calls.
    let partial = harness
        .engine
        .resume(
            "s1",
            message_id,
            vec![ToolResult::ok("call_a", "browser_fetch", serde_json::json!("<a>"))],
        )
        .await
        .unwrap();
    assert_eq!(
        partial,
        ResumeOutcome::AwaitingMore {
            remaining: vec!["call_b".to_string()]
        }
    );

    // Redelivering the same result changes nothing and stays idempotent.
    let duplicate = harness
        .engine
        .resume(
            "s1",
            message_id,
            vec![ToolResult::ok("call_a", "browser_fetch", serde_json::json!("<a2>"))],
        )
        .await
        .unwrap();
    assert_eq!(
        duplicate,
        ResumeOutcome::AwaitingMore {
            remaining: vec!["call_b".to_string()]
        }
    );
    let message = harness
        .messages
        .get("s1", message_id)
        .await
        .unwrap()
        .unwrap();
    let call_a_results: Vec<_> = message
        .tool_results
        .iter()
        .filter(|r| r.tool_call_id == "call_a")
        .collect();
    assert_eq!(call_a_results.len(), 1);
    // Overwrite, not append: the second payload won.
    assert_eq!(call_a_results[0].data, Some(serde_json::json!("<a2>")));

    // Covering the set resumes the round to completion.
    let resumed = harness
        .engine
        .resume(
            "s1",
            message_id,
            vec![ToolResult::ok("call_b", "browser_fetch", serde_json::json!("<b>"))],
        )
        .await
        .unwrap();
    assert!(matches!(
        resumed,
        ResumeOutcome::Resumed(EpisodeOutcome::Completed {
            reason: StopReason::PlainReply,
            ..
        })
    ));
}

#[tokio::test]
async fn paused_round_survives_a_process_restart() {
    let harness = Harness::new(
        vec![ScriptedCall::Chunks(tool_round(
            "call_r",
            "browser_fetch",
            &["{\"url\":\"x\"}"],
        ))],
        remote_registry(),
    );

    let outcome = harness
        .engine
        .submit(SubmitRequest::new("s1", "fetch"))
        .await
        .unwrap();
    let EpisodeOutcome::Paused { message_id, .. } = outcome else {
        panic!("expected pause");
    };

    // A new engine over the same stores — the first process is gone.
    let (engine2, client2) = harness.restarted(
        vec![ScriptedCall::Chunks(text_round("Done after restart."))],
        remote_registry(),
    );

    let resumed = engine2
        .resume(
            "s1",
            message_id,
            vec![ToolResult::ok("call_r", "browser_fetch", serde_json::json!("<html>"))],
        )
        .await
        .unwrap();
    assert!(matches!(
        resumed,
        ResumeOutcome::Resumed(EpisodeOutcome::Completed { .. })
    ));
    assert_eq!(client2.call_count(), 1);

    let session = harness.sessions.get("s1").await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Idle);
}

#[tokio::test]
async fn cancel_while_paused_winds_down_on_delivery() {
    let harness = Harness::new(
        vec![ScriptedCall::Chunks(tool_round(
            "call_r",
            "browser_fetch",
            &["{}"],
        ))],
        remote_registry(),
    );

    let outcome = harness
        .engine
        .submit(SubmitRequest::new("s1", "fetch"))
        .await
        .unwrap();
    let EpisodeOutcome::Paused { message_id, .. } = outcome else {
        panic!("expected pause");
    };

    assert!(harness.engine.cancel("s1").await.unwrap());

    let resumed = harness
        .engine
        .resume(
            "s1",
            message_id,
            vec![ToolResult::ok("call_r", "browser_fetch", serde_json::json!(null))],
        )
        .await
        .unwrap();
    assert_eq!(resumed, ResumeOutcome::Resumed(EpisodeOutcome::Cancelled));

    let history = harness.messages.history("s1").await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert!(last.content.to_lowercase().contains("cancel"));
}

#[tokio::test]
async fn delivery_without_a_paused_round_is_rejected() {
    let harness = Harness::new(
        vec![ScriptedCall::Chunks(text_round("plain reply"))],
        ToolRegistry::new(),
    );

    let outcome = harness
        .engine
        .submit(SubmitRequest::new("s1", "hi"))
        .await
        .unwrap();
    let EpisodeOutcome::Completed { last_message_id, .. } = outcome else {
        panic!("expected completion");
    };

    let err = harness
        .engine
        .resume(
            "s1",
            last_message_id,
            vec![ToolResult::ok("call_x", "browser_fetch", serde_json::json!(null))],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DroverError::InvalidSessionState(_)));
}

#[tokio::test]
async fn delivery_for_unknown_call_ids_is_discarded() {
    let harness = Harness::new(
        vec![
            ScriptedCall::Chunks(tool_round("call_r", "browser_fetch", &["{}"])),
            ScriptedCall::Chunks(text_round("done")),
        ],
        remote_registry(),
    );

    let outcome = harness
        .engine
        .submit(SubmitRequest::new("s1", "fetch"))
        .await
        .unwrap();
    let EpisodeOutcome::Paused { message_id, .. } = outcome else {
        panic!("expected pause");
    };

    // A result for an id the round never asked for does not advance it.
    let outcome = harness
        .engine
        .resume(
            "s1",
            message_id,
            vec![ToolResult::ok("call_zzz", "browser_fetch", serde_json::json!(null))],
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ResumeOutcome::AwaitingMore {
            remaining: vec!["call_r".to_string()]
        }
    );
    let message = harness
        .messages
        .get("s1", message_id)
        .await
        .unwrap()
        .unwrap();
    assert!(message.tool_results.is_empty());
}
