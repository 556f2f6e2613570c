//! Session storage

use super::{Session, SessionError};
use crate::clock::{Clock, SystemClock};
use dashmap::DashMap;
use std::sync::Arc;

/// Backing storage for sessions
///
/// Implementations serialize access per session id; the gate never holds a
/// session across requests.
pub trait SessionStore: Send + Sync {
    /// Load a session by id, `None` if unknown or expired
    fn load(&self, id: &str) -> Result<Option<Session>, SessionError>;

    /// Insert or replace a session
    fn save(&self, session: &Session) -> Result<(), SessionError>;

    /// Remove a session
    fn destroy(&self, id: &str) -> Result<(), SessionError>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    session: Session,
    touched_at: i64,
}

/// In-memory session storage
///
/// Entries expire after `lifetime_seconds` without a save. Expired entries are
/// invisible to [`load`](SessionStore::load) and removed by
/// [`prune_expired`](InMemorySessionStore::prune_expired).
///
/// Sessions are lost when the process restarts.
pub struct InMemorySessionStore {
    sessions: DashMap<String, StoredSession>,
    lifetime_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionStore {
    pub fn new(lifetime_seconds: u64) -> Self {
        Self::with_clock(lifetime_seconds, Arc::new(SystemClock))
    }

    pub fn with_clock(lifetime_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            lifetime_seconds: i64::try_from(lifetime_seconds).unwrap_or(i64::MAX),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove expired sessions, returning how many were dropped
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, stored| !self.is_expired(stored.touched_at, now));
        before.saturating_sub(self.sessions.len())
    }

    fn is_expired(&self, touched_at: i64, now: i64) -> bool {
        now.saturating_sub(touched_at) >= self.lifetime_seconds
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let now = self.clock.now();

        // The expiry check and the removal happen under one shard lock so a
        // concurrent save of the same id is never dropped
        if self
            .sessions
            .remove_if(id, |_, stored| self.is_expired(stored.touched_at, now))
            .is_some()
        {
            return Ok(None);
        }

        Ok(self
            .sessions
            .get(id)
            .filter(|stored| !self.is_expired(stored.touched_at, now))
            .map(|stored| stored.session.clone()))
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let mut stored = session.clone();
        stored.mark_saved();
        self.sessions.insert(
            session.id().to_string(),
            StoredSession {
                session: stored,
                touched_at: self.clock.now(),
            },
        );
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.sessions.remove(id);
        Ok(())
    }
}
