use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::ConversationState;

/// Shared handle to one session's state.
pub type SessionHandle = Arc<Mutex<ConversationState>>;

struct Entry {
    handle: SessionHandle,
    last_used: AtomicU64,
}

/// In-memory sessions keyed by ID, capped at `max_sessions`.
///
/// The map lock is held only to look up or insert a handle; turns then
/// serialize on the per-session mutex. Creating a session past the cap
/// evicts the least recently used one.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
    clock: AtomicU64,
    window: usize,
    max_sessions: usize,
}

impl SessionStore {
    /// Store whose sessions keep `window` messages, holding at most
    /// `max_sessions` of them.
    pub fn new(window: usize, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            window,
            max_sessions: max_sessions.max(1),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Handle for `session_id`, created empty on first use.
    pub async fn session(&self, session_id: &str) -> SessionHandle {
        if let Some(entry) = self.sessions.read().await.get(session_id) {
            entry.last_used.store(self.tick(), Ordering::Relaxed);
            return entry.handle.clone();
        }

        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get(session_id) {
            entry.last_used.store(self.tick(), Ordering::Relaxed);
            return entry.handle.clone();
        }

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                .map(|(id, _)| id.clone());
            let Some(oldest) = oldest else { break };
            sessions.remove(&oldest);
            info!(
                session_id = %oldest,
                max_sessions = self.max_sessions,
                "Evicted least recently used session"
            );
        }

        debug!(session_id = %session_id, "Creating session");
        let handle = Arc::new(Mutex::new(ConversationState::new(self.window)));
        sessions.insert(
            session_id.to_string(),
            Entry {
                handle: handle.clone(),
                last_used: AtomicU64::new(self.tick()),
            },
        );
        handle
    }

    /// Handle for an existing session.
    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| entry.handle.clone())
    }

    /// Drop a session. Returns whether it existed.
    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether there are no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
