// store.rs — In-memory session store with per-session exclusive locks.
//
// Concurrent sessions are fully independent; overlapping requests against
// the SAME session must serialize, because session-metadata mutation is
// order-sensitive. The store hands out handles wrapping an Arc<Mutex<_>>
// per session: the outer map lock is held only for lookup, the inner
// per-session mutex is the single-writer discipline.
//
// Persistence is deliberately absent — the backing technology is the
// caller's concern, and sessions here live and die with the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::error::SessionError;
use crate::state::SessionState;

/// A checked-out session. Lock it to read or mutate the state; the lock
/// is the per-session serialization point.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    inner: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Acquire the session's exclusive lock.
    ///
    /// A poisoned lock means a holder panicked mid-mutation; the state
    /// cannot be trusted and the session is reported corrupted.
    pub fn lock(&self) -> Result<MutexGuard<'_, SessionState>, SessionError> {
        self.inner
            .lock()
            .map_err(|_| SessionError::Corrupted(self.session_id.clone()))
    }
}

/// In-memory store of all live sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Mutex<SessionState>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a brand-new session with a generated id. Used when a
    /// request arrives without continuation context.
    pub fn open_new(&self) -> Result<SessionHandle, SessionError> {
        let session_id = Uuid::new_v4().to_string();
        self.create(&session_id)
    }

    /// Create a session under a caller-chosen id. Fails if it exists.
    pub fn create(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| SessionError::Corrupted(session_id.to_string()))?;
        if sessions.contains_key(session_id) {
            return Err(SessionError::Corrupted(format!(
                "{session_id} (already exists)"
            )));
        }
        let inner = Arc::new(Mutex::new(SessionState::new(session_id)));
        sessions.insert(session_id.to_string(), Arc::clone(&inner));
        tracing::info!(session_id, "session created");
        Ok(SessionHandle {
            session_id: session_id.to_string(),
            inner,
        })
    }

    /// Check out an existing session, destroying it first if it has
    /// outlived `ttl_secs`.
    pub fn checkout(&self, session_id: &str, ttl_secs: i64) -> Result<SessionHandle, SessionError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| SessionError::Corrupted(session_id.to_string()))?;
        let inner = sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::Unknown(session_id.to_string()))?;

        let expired = {
            let state = inner
                .lock()
                .map_err(|_| SessionError::Corrupted(session_id.to_string()))?;
            state.expired(ttl_secs)
        };
        if expired {
            sessions.remove(session_id);
            tracing::info!(session_id, "session expired and destroyed");
            return Err(SessionError::Expired(session_id.to_string()));
        }
        Ok(SessionHandle {
            session_id: session_id.to_string(),
            inner,
        })
    }

    /// Check out `session_id` if given and alive, else open a new session.
    pub fn checkout_or_create(
        &self,
        session_id: Option<&str>,
        ttl_secs: i64,
    ) -> Result<SessionHandle, SessionError> {
        match session_id {
            None => self.open_new(),
            Some(id) => match self.checkout(id, ttl_secs) {
                Ok(handle) => Ok(handle),
                // A request naming a dead session starts over with a
                // fresh one under a new id.
                Err(SessionError::Unknown(_)) | Err(SessionError::Expired(_)) => self.open_new(),
                Err(other) => Err(other),
            },
        }
    }

    /// Destroy a session. Returns whether it existed.
    pub fn destroy(&self, session_id: &str) -> bool {
        let Ok(mut sessions) = self.sessions.lock() else {
            return false;
        };
        let removed = sessions.remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "session destroyed");
        }
        removed
    }

    /// Remove every session that has outlived `ttl_secs`. Returns the
    /// number destroyed.
    pub fn sweep_expired(&self, ttl_secs: i64) -> usize {
        let Ok(mut sessions) = self.sessions.lock() else {
            return 0;
        };
        let before = sessions.len();
        sessions.retain(|_, inner| match inner.lock() {
            Ok(state) => !state.expired(ttl_secs),
            // Poisoned sessions are unusable; sweep them too.
            Err(_) => false,
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
