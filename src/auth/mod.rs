//! Authentication module
//!
//! Token verification, path exemptions and the session persister capability
//! used by the gate.

use thiserror::Error;

pub mod ignore;
pub mod jwt;
pub mod persister;

pub use ignore::{IgnoreRule, PathExemptions, PatternError};
pub use jwt::{TokenPayload, TokenVerifier};
pub use persister::{SessionPersister, TimeoutSessionPersister};

/// Authentication errors
///
/// The variants are kept apart for logging and metrics only. Clients always
/// see the same 403 response whichever of them occurred.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl AuthError {
    /// Short label used for the verification metric
    pub fn label(&self) -> &'static str {
        match self {
            AuthError::InvalidToken(_) => "malformed",
            AuthError::TokenExpired => "expired",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::InvalidKey(_) => "invalid_key",
        }
    }
}
