use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::SessionError;

use super::state::SessionState;

/// One session: an externally supplied id plus its `SessionState`. Mutation
/// is confined to the driver owning this session's lock for the duration
/// of one OODA iteration.
pub struct Session {
    pub id: String,
    pub state: Mutex<SessionState>,
}

/// Explicit, injected registry of live sessions — replaces the original's
/// module-level mapping (see DESIGN NOTES: global state -> explicit
/// scopes). Sessions have no shared mutable state with each other; the
/// registry itself only guards the map of ids to sessions, never state
/// within a session.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<scc::HashMap<String, Arc<Session>>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(scc::HashMap::new()),
            max_sessions,
        }
    }

    /// Creates a session lazily on first use of an id, or returns the
    /// existing one.
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        if let Some(entry) = self.sessions.get_async(id).await {
            return Ok(entry.get().clone());
        }
        if self.sessions.len() >= self.max_sessions {
            return Err(SessionError::TooManySessions(self.max_sessions));
        }
        let session = Arc::new(Session {
            id: id.to_owned(),
            state: Mutex::new(SessionState::new()),
        });
        let _ = self.sessions.insert_async(id.to_owned(), session.clone()).await;
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get_async(id).await.map(|e| e.get().clone())
    }

    /// Explicit teardown; the caller decides when a session's lifecycle
    /// ends (the core never expires sessions on its own).
    pub async fn remove(&self, id: &str) {
        let _ = self.sessions.remove_async(id).await;
    }
}
