//! Browser sessions
//!
//! A [`Session`] is an opaque key/value bag tied to one client by a signed
//! cookie. The gate only touches it through the keys defined here; the
//! storage behind it is a [`SessionStore`].

mod cookie;
mod store;

pub use cookie::SessionCookie;
pub use store::{InMemorySessionStore, SessionStore};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Unix timestamp of the last successful token verification
pub const LAST_AUTHENTICATED_AT: &str = "jwt_last_authenticated_time";

/// Identity data taken from the last verified token
pub const USER_DATA: &str = "jwt_user_data";

/// URL to return to once the login round-trip completes
pub const PENDING_REDIRECT_URL: &str = "url_after_jwt_authentication";

/// Session store errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session store error: {0}")]
    Store(String),
}

/// One client's session data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: String,
    values: HashMap<String, Value>,
    #[serde(skip)]
    changed: bool,
}

impl Session {
    /// Empty session with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: HashMap::new(),
            changed: false,
        }
    }

    /// Empty session with a fresh random id
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
        self.changed = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True once any value was inserted or removed since load
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Forget pending changes, typically after the store persisted them
    pub fn mark_saved(&mut self) {
        self.changed = false;
    }
}
