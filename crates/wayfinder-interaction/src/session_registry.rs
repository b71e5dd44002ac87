//! Provider session handles keyed by thread id.

use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Provider-side conversation state for one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: String,
    pub thread_id: String,
    /// Number of requests sent through this handle.
    pub turns: u64,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `thread_id`, creating one on first use.
    pub fn acquire(&self, thread_id: &str) -> SessionHandle {
        let mut sessions = self.lock();
        let handle = sessions
            .entry(thread_id.to_string())
            .or_insert_with(|| SessionHandle {
                id: Uuid::new_v4().to_string(),
                thread_id: thread_id.to_string(),
                turns: 0,
            });
        handle.turns += 1;
        handle.clone()
    }

    pub fn get(&self, thread_id: &str) -> Option<SessionHandle> {
        self.lock().get(thread_id).cloned()
    }

    /// Moves the handle of `from` to `to`, replacing any handle `to` had.
    ///
    /// Returns `false` when `from` has no handle.
    pub fn rekey(&self, from: &str, to: &str) -> bool {
        let mut sessions = self.lock();
        let Some(mut handle) = sessions.remove(from) else {
            return false;
        };
        handle.thread_id = to.to_string();
        if sessions.insert(to.to_string(), handle).is_some() {
            tracing::debug!("[SessionRegistry] Replaced existing session of '{}'", to);
        }
        tracing::debug!("[SessionRegistry] Re-keyed session '{}' -> '{}'", from, to);
        true
    }

    pub fn release(&self, thread_id: &str) -> Option<SessionHandle> {
        self.lock().remove(thread_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
