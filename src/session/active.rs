//! Registry of in-process state for live rounds.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

/// In-process handle for a session's active round.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub cancel: CancellationToken,
}

/// Per-session registry with an explicit lifecycle: an entry is created when
/// a round begins (or resumes) and torn down when it finishes or pauses.
///
/// Only in-process, non-authoritative state lives here — the durable record
/// of a round is in the stores. Injected as a dependency, never global.
#[derive(Debug, Default)]
pub struct ActiveSessions {
    inner: Mutex<HashMap<String, ActiveSession>>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh handle for a session, replacing any stale one.
    pub fn activate(&self, session_id: &str) -> ActiveSession {
        let handle = ActiveSession {
            cancel: CancellationToken::new(),
        };
        self.inner
            .lock()
            .unwrap()
            .insert(session_id.to_string(), handle.clone());
        handle
    }

    pub fn get(&self, session_id: &str) -> Option<ActiveSession> {
        self.inner.lock().unwrap().get(session_id).cloned()
    }

    /// Cancel the in-process token, if a round is live here.
    ///
    /// Returns `false` when the session runs in another process (or not at
    /// all); durable cancellation goes through the session gate either way.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.inner.lock().unwrap().get(session_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Tear down the handle at round end.
    pub fn deactivate(&self, session_id: &str) {
        self.inner.lock().unwrap().remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
