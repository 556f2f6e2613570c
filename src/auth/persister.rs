//! Session persisters
//!
//! A [`SessionPersister`] decides whether a session currently represents an
//! authenticated identity and records a successful token verification. The
//! gate only ever talks to this trait, never to the session keys themselves.

use super::TokenPayload;
use crate::clock::{Clock, SystemClock};
use crate::session::{Session, LAST_AUTHENTICATED_AT, USER_DATA};
use serde_json::Value;
use std::sync::Arc;

/// Authentication state strategy
pub trait SessionPersister: Send + Sync {
    /// True if the session represents a current, non-expired identity
    fn is_authenticated(&self, session: &Session) -> bool;

    /// Record a successful verification of `payload` for this session
    fn record_authentication(&self, session: &mut Session, payload: &TokenPayload);
}

/// Default persister with a sliding timeout
///
/// Stores the verification time and the token's user data in the session.
/// A session is authenticated while `now - last_authenticated_at < timeout`.
///
/// # Example
///
/// ```
/// use sso_gate::auth::{SessionPersister, TimeoutSessionPersister, TokenPayload};
/// use sso_gate::session::Session;
///
/// let persister = TimeoutSessionPersister::new(600);
/// let mut session = Session::new("s1");
/// assert!(!persister.is_authenticated(&session));
///
/// persister.record_authentication(&mut session, &TokenPayload::default());
/// assert!(persister.is_authenticated(&session));
/// ```
pub struct TimeoutSessionPersister {
    timeout_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl TimeoutSessionPersister {
    pub fn new(timeout_seconds: u64) -> Self {
        Self::with_clock(timeout_seconds, Arc::new(SystemClock))
    }

    pub fn with_clock(timeout_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            timeout_seconds: i64::try_from(timeout_seconds).unwrap_or(i64::MAX),
            clock,
        }
    }

    pub fn timeout_seconds(&self) -> i64 {
        self.timeout_seconds
    }

    /// When the session was last authenticated
    pub fn last_authenticated_at(session: &Session) -> Option<i64> {
        session.get(LAST_AUTHENTICATED_AT).and_then(Value::as_i64)
    }
}

impl SessionPersister for TimeoutSessionPersister {
    fn is_authenticated(&self, session: &Session) -> bool {
        match Self::last_authenticated_at(session) {
            Some(at) => self.clock.now().saturating_sub(at) < self.timeout_seconds,
            None => false,
        }
    }

    fn record_authentication(&self, session: &mut Session, payload: &TokenPayload) {
        session.insert(USER_DATA, payload.user_data());
        session.insert(LAST_AUTHENTICATED_AT, Value::from(self.clock.now()));
    }
}
