//! JWT verification
//!
//! Supports the HMAC (HS*), RSA (RS*, PS*), ECDSA (ES*) and EdDSA families.
//! Expiry is enforced with zero leeway.

use super::AuthError;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Decoded claims of a verified token
///
/// Holds the payload exactly as it was signed. Which part of it ends up in
/// the session is the persister's call.
///
/// # Example
///
/// ```
/// use serde_json::{json, Map, Value};
/// use sso_gate::auth::TokenPayload;
///
/// let mut claims = Map::new();
/// claims.insert("exp".into(), json!(1_700_000_000));
/// claims.insert("sub".into(), json!("ada"));
/// let payload = TokenPayload::from(claims);
///
/// assert_eq!(payload.claims().len(), 2);
/// assert!(payload.user().is_none());
/// assert_eq!(payload.into_inner().get("sub"), Some(&Value::from("ada")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenPayload(Map<String, Value>);

impl TokenPayload {
    /// All claims
    pub fn claims(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Look up a single claim
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    /// The `exp` claim as a Unix timestamp
    pub fn exp(&self) -> Option<i64> {
        self.0.get("exp").and_then(Value::as_i64)
    }

    /// The `user` claim, if the issuer sent one
    pub fn user(&self) -> Option<&Value> {
        self.0.get("user")
    }

    /// Identity data to remember for the session
    ///
    /// The `user` claim when present, otherwise the whole payload.
    pub fn user_data(&self) -> Value {
        match self.user() {
            Some(user) => user.clone(),
            None => Value::Object(self.0.clone()),
        }
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for TokenPayload {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}

/// JWT verifier bound to one key and one algorithm
///
/// # Example
///
/// ```
/// use sso_gate::auth::jwt::TokenVerifier;
///
/// let verifier = TokenVerifier::new("my-secret", "HS512").unwrap();
/// assert!(verifier.verify("not-a-token").is_err());
/// ```
pub struct TokenVerifier {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier for `algorithm` (e.g. `HS512`, `RS256`)
    ///
    /// HMAC algorithms take the raw secret, every other family expects a PEM
    /// encoded public key.
    pub fn new(key: &str, algorithm: &str) -> Result<Self, AuthError> {
        let algorithm = Algorithm::from_str(algorithm.trim())
            .map_err(|_| AuthError::UnsupportedAlgorithm(algorithm.to_string()))?;

        let decoding_key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                DecodingKey::from_secret(key.as_bytes())
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(key.as_bytes())
                .map_err(|e| AuthError::InvalidKey(e.to_string()))?,
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(key.as_bytes())
                .map_err(|e| AuthError::InvalidKey(e.to_string()))?,
            Algorithm::EdDSA => DecodingKey::from_ed_pem(key.as_bytes())
                .map_err(|e| AuthError::InvalidKey(e.to_string()))?,
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.validate_aud = false;

        Ok(Self {
            algorithm,
            decoding_key,
            validation,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Verify signature and expiry, returning the payload unmodified
    pub fn verify(&self, token: &str) -> Result<TokenPayload, AuthError> {
        let token_data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken(e.to_string()),
            })?;

        Ok(TokenPayload(token_data.claims))
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
