//! Per-session conversation history and last search results.
//!
//! Sessions are created on first reference and identified by an opaque,
//! caller-supplied id. Each session sits behind its own lock; the session
//! table is only locked long enough to find or insert an entry, so work on
//! one session never waits for another. The table is bounded: the least
//! recently used session is evicted at capacity, and sessions idle past the
//! configured timeout are replaced with a fresh one on next use.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::SessionConfig;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A product from the most recent result set, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultLink {
    pub title: String,
    pub link: String,
}

#[derive(Debug)]
struct SessionState {
    /// Index 0 is the persona and is never modified.
    history: Vec<ChatTurn>,
    last_results: Vec<ResultLink>,
}

struct Slot {
    state: Arc<Mutex<SessionState>>,
    last_active: Instant,
}

/// In-memory store of all live sessions.
pub struct SessionMemory {
    sessions: std::sync::Mutex<LruCache<String, Slot>>,
    persona: String,
    idle_timeout: Option<Duration>,
    history_window: usize,
}

impl SessionMemory {
    pub fn new(config: &SessionConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: std::sync::Mutex::new(LruCache::new(capacity)),
            persona: config.persona.clone(),
            idle_timeout: config.idle_timeout(),
            history_window: config.history_window,
        }
    }

    /// Append a turn, creating the session if needed.
    pub async fn append_turn(&self, session_id: &str, role: ChatRole, content: impl Into<String>) {
        let state = self.session(session_id);
        state
            .lock()
            .await
            .history
            .push(ChatTurn::new(role, content));
    }

    /// Full history, persona first.
    pub async fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        let state = self.session(session_id);
        state.lock().await.history.clone()
    }

    /// Persona followed by the last `history_window` turns.
    pub async fn recent_history(&self, session_id: &str) -> Vec<ChatTurn> {
        let state = self.session(session_id);
        let guard = state.lock().await;
        let (persona, turns) = guard.history.split_at(1);
        let skip = turns.len().saturating_sub(self.history_window);
        persona.iter().chain(&turns[skip..]).cloned().collect()
    }

    /// Replace the session's most recent result set.
    pub async fn set_last_results(&self, session_id: &str, results: Vec<ResultLink>) {
        let state = self.session(session_id);
        state.lock().await.last_results = results;
    }

    /// The most recent result set, or empty if the session has none.
    pub async fn last_results(&self, session_id: &str) -> Vec<ResultLink> {
        let Some(state) = self.existing(session_id) else {
            return Vec::new();
        };
        state.lock().await.last_results.clone()
    }

    /// Whether a live session exists for `session_id`. Does not refresh the
    /// session or remove it when expired.
    pub fn contains(&self, session_id: &str) -> bool {
        self.table()
            .peek(session_id)
            .is_some_and(|slot| !self.is_expired(slot))
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every session idle past the timeout; returns how many.
    pub fn prune_idle(&self) -> usize {
        let Some(timeout) = self.idle_timeout else {
            return 0;
        };
        let mut table = self.table();
        let expired: Vec<String> = table
            .iter()
            .filter(|(_, slot)| slot.last_active.elapsed() >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            table.pop(id);
        }
        if !expired.is_empty() {
            debug!("Pruned {} idle sessions", expired.len());
        }
        expired.len()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, LruCache<String, Slot>> {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn is_expired(&self, slot: &Slot) -> bool {
        self.idle_timeout
            .is_some_and(|timeout| slot.last_active.elapsed() >= timeout)
    }

    fn existing(&self, session_id: &str) -> Option<Arc<Mutex<SessionState>>> {
        let mut table = self.table();
        let expired = self.is_expired(table.peek(session_id)?);
        if expired {
            debug!("Session {session_id} expired");
            table.pop(session_id);
            return None;
        }
        let slot = table.get_mut(session_id)?;
        slot.last_active = Instant::now();
        Some(Arc::clone(&slot.state))
    }

    fn session(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        if let Some(state) = self.existing(session_id) {
            return state;
        }

        let state = Arc::new(Mutex::new(SessionState {
            history: vec![ChatTurn::new(ChatRole::System, self.persona.clone())],
            last_results: Vec::new(),
        }));
        let mut table = self.table();
        // Lost a race with another creator: keep theirs.
        if let Some(slot) = table.get_mut(session_id) {
            slot.last_active = Instant::now();
            return Arc::clone(&slot.state);
        }
        let slot = Slot {
            state: Arc::clone(&state),
            last_active: Instant::now(),
        };
        if let Some((evicted, _)) = table.push(session_id.to_string(), slot) {
            debug!("Evicted session {evicted} at capacity");
        }
        state
    }
}
