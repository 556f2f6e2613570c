//! Authentication gate
//!
//! Decides, for every request, whether to pass it through, accept a
//! presented token, honour an existing session or send the client to log in.
//!
//! Checks run in a fixed order and the first one that applies wins:
//!
//! 1. No signing key configured: pass through.
//! 2. Method and path match an ignore rule: pass through.
//! 3. Token parameter present: verify it. On failure answer 403, on success
//!    record the authentication and redirect to the remembered URL (or `/`).
//! 4. No token: remember the request URL, then pass through if the session
//!    is authenticated, otherwise redirect to the login URL.

mod request;

pub use request::{parse_params, GateRequest};

use crate::auth::{AuthError, IgnoreRule, PathExemptions, PatternError};
use crate::auth::{SessionPersister, TimeoutSessionPersister, TokenVerifier};
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::metrics;
use crate::session::{Session, PENDING_REDIRECT_URL};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, LOCATION};
use hyper::{Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Body of the 403 answer to an unverifiable token
pub const UNAUTHORIZED_MESSAGE: &str = "Could not verify your JWT token. This means we can not give you access. Contact the sysadmin if the problem persists.";

/// Gate construction errors
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid token configuration: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid ignore rule: {0}")]
    Pattern(#[from] PatternError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Why a request was handed to the downstream application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passthrough {
    /// No signing key, the gate is disabled
    Unconfigured,
    /// Matched an ignore rule
    Exempt,
    /// The session is still authenticated
    SessionValid,
}

/// Answer produced by the gate itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResponse {
    /// Token accepted, back to where the client was going
    RedirectAfterAuth { location: String },
    /// Not authenticated, off to the login service
    RedirectToLogin { location: String },
    /// Login redirect replaced by a 200 naming the target
    FakeRedirect { location: String },
    /// Token could not be verified
    Rejected,
}

impl GateResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            GateResponse::RedirectAfterAuth { .. } | GateResponse::RedirectToLogin { .. } => {
                StatusCode::FOUND
            }
            GateResponse::FakeRedirect { .. } => StatusCode::OK,
            GateResponse::Rejected => StatusCode::FORBIDDEN,
        }
    }

    /// Render as an HTTP response
    pub fn into_response(self) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
        let builder = Response::builder().status(self.status());
        match self {
            GateResponse::RedirectAfterAuth { location }
            | GateResponse::RedirectToLogin { location } => builder
                .header(LOCATION, location)
                .body(Full::new(Bytes::new())),
            GateResponse::FakeRedirect { location } => builder
                .header(CONTENT_TYPE, "text/plain")
                .body(Full::new(Bytes::from(format!(
                    "Fake redirect to: {}",
                    location
                )))),
            GateResponse::Rejected => builder
                .header(CONTENT_TYPE, "text/plain")
                .body(Full::new(Bytes::from_static(UNAUTHORIZED_MESSAGE.as_bytes()))),
        }
    }
}

/// Outcome of evaluating one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Forward(Passthrough),
    Respond(GateResponse),
}

impl Decision {
    /// Label for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Forward(Passthrough::Unconfigured) => "unconfigured",
            Decision::Forward(Passthrough::Exempt) => "exempt",
            Decision::Forward(Passthrough::SessionValid) => "session",
            Decision::Respond(GateResponse::RedirectAfterAuth { .. }) => "authenticated",
            Decision::Respond(GateResponse::RedirectToLogin { .. }) => "login",
            Decision::Respond(GateResponse::FakeRedirect { .. }) => "fake_login",
            Decision::Respond(GateResponse::Rejected) => "rejected",
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, Decision::Forward(_))
    }
}

/// Everything an active gate needs
struct ActiveGate {
    verifier: TokenVerifier,
    exemptions: PathExemptions,
    persister: Arc<dyn SessionPersister>,
    token_param_name: String,
    login_redirect_url: String,
    fake_redirect: bool,
}

/// The decision engine
///
/// Built once from [`AuthConfig`] and shared read-only by all requests.
///
/// # Example
///
/// ```
/// use sso_gate::config::AuthConfig;
/// use sso_gate::gate::{Decision, Gate, GateRequest, GateResponse};
/// use sso_gate::session::Session;
///
/// let gate = Gate::from_config(&AuthConfig {
///     signing_key: Some("secret".into()),
///     login_redirect_url: Some("https://sso.example.com/login".into()),
///     ..Default::default()
/// }).unwrap();
///
/// let request = GateRequest::new("GET", "http://app.example.com/dashboard").unwrap();
/// let mut session = Session::new("s1");
///
/// assert_eq!(
///     gate.evaluate(&request, &mut session),
///     Decision::Respond(GateResponse::RedirectToLogin {
///         location: "https://sso.example.com/login".into(),
///     })
/// );
/// ```
pub struct Gate {
    active: Option<ActiveGate>,
}

impl Gate {
    /// Start building a gate from configuration
    pub fn builder(config: AuthConfig) -> GateBuilder {
        GateBuilder {
            config,
            persister: None,
            clock: None,
        }
    }

    /// Build a gate with the default timeout persister
    pub fn from_config(config: &AuthConfig) -> Result<Self, GateError> {
        Self::builder(config.clone()).build()
    }

    /// A gate that passes everything through
    pub fn disabled() -> Self {
        Self { active: None }
    }

    pub fn is_configured(&self) -> bool {
        self.active.is_some()
    }

    /// Decide what to do with a request
    ///
    /// The session is only written through the persister and for the pending
    /// redirect URL. Verification failures leave it untouched.
    pub fn evaluate(&self, request: &GateRequest, session: &mut Session) -> Decision {
        let Some(gate) = &self.active else {
            return Decision::Forward(Passthrough::Unconfigured);
        };

        if gate.exemptions.is_exempt(&request.method, &request.path) {
            debug!(method = %request.method, path = %request.path, "Ignored path");
            return Decision::Forward(Passthrough::Exempt);
        }

        match request.param(&gate.token_param_name) {
            Some(token) => match gate.verifier.verify(token) {
                Ok(payload) => {
                    metrics::record_token_verification("valid");
                    gate.persister.record_authentication(session, &payload);

                    let location = session
                        .remove(PENDING_REDIRECT_URL)
                        .and_then(|url| match url {
                            Value::String(url) => Some(url),
                            _ => None,
                        })
                        .unwrap_or_else(|| "/".to_string());

                    info!(path = %request.path, location = %location, "Token accepted");
                    Decision::Respond(GateResponse::RedirectAfterAuth { location })
                }
                Err(e) => {
                    metrics::record_token_verification(e.label());
                    warn!(path = %request.path, "Token rejected: {}", e);
                    Decision::Respond(GateResponse::Rejected)
                }
            },
            None => {
                session.insert(PENDING_REDIRECT_URL, Value::String(request.url.clone()));

                if gate.persister.is_authenticated(session) {
                    Decision::Forward(Passthrough::SessionValid)
                } else {
                    let location = gate.login_redirect_url.clone();
                    debug!(url = %request.url, login = %location, "Authentication required");
                    if gate.fake_redirect {
                        Decision::Respond(GateResponse::FakeRedirect { location })
                    } else {
                        Decision::Respond(GateResponse::RedirectToLogin { location })
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.active {
            Some(gate) => f
                .debug_struct("Gate")
                .field("algorithm", &gate.verifier.algorithm())
                .field("token_param_name", &gate.token_param_name)
                .field("login_redirect_url", &gate.login_redirect_url)
                .field("ignore_rules", &gate.exemptions.len())
                .field("fake_redirect", &gate.fake_redirect)
                .finish(),
            None => f.write_str("Gate(disabled)"),
        }
    }
}

/// Builder for [`Gate`]
pub struct GateBuilder {
    config: AuthConfig,
    persister: Option<Arc<dyn SessionPersister>>,
    clock: Option<Arc<dyn Clock>>,
}

impl GateBuilder {
    /// Replace the default timeout persister
    #[must_use]
    pub fn with_persister(mut self, persister: Arc<dyn SessionPersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Clock for the default persister
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Add an ignore rule on top of the configured ones
    #[must_use]
    pub fn ignore(mut self, rule: IgnoreRule) -> Self {
        self.config.ignore.push(rule);
        self
    }

    pub fn build(self) -> Result<Gate, GateError> {
        let config = self.config;

        let Some(signing_key) = config.signing_key else {
            return Ok(Gate::disabled());
        };

        let login_redirect_url = config
            .login_redirect_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(GateError::MissingConfig("login_redirect_url"))?;

        if config.session_timeout_seconds == 0 {
            return Err(GateError::InvalidConfig(
                "session_timeout_seconds must be greater than zero".into(),
            ));
        }

        if config.token_param_name.trim().is_empty() {
            return Err(GateError::MissingConfig("token_param_name"));
        }

        let verifier = TokenVerifier::new(&signing_key, &config.algorithm)?;
        let exemptions = PathExemptions::new(&config.ignore)?;

        let persister = match self.persister {
            Some(persister) => persister,
            None => {
                let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
                Arc::new(TimeoutSessionPersister::with_clock(
                    config.session_timeout_seconds,
                    clock,
                ))
            }
        };

        Ok(Gate {
            active: Some(ActiveGate {
                verifier,
                exemptions,
                persister,
                token_param_name: config.token_param_name,
                login_redirect_url,
                fake_redirect: config.fake_redirect,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::{LAST_AUTHENTICATED_AT, USER_DATA};
    use http_body_util::BodyExt;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;

    const LOGIN: &str = "http://example.com/request_jwt_auth?app=demo";

    fn secret() -> String {
        "test".repeat(20)
    }

    fn config() -> AuthConfig {
        AuthConfig {
            signing_key: Some(secret()),
            algorithm: "HS512".into(),
            token_param_name: "token".into(),
            login_redirect_url: Some(LOGIN.into()),
            ..Default::default()
        }
    }

    fn token(claims: Value) -> String {
        encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(secret().as_bytes()),
        )
        .unwrap()
    }

    fn valid_token() -> String {
        token(json!({"exp": chrono::Utc::now().timestamp() + 2, "user": {"id": 1}}))
    }

    fn get(url: &str) -> GateRequest {
        GateRequest::new("GET", url).unwrap()
    }

    #[test]
    fn test_disabled_gate_forwards() {
        let gate = Gate::from_config(&AuthConfig::default()).unwrap();
        let mut session = Session::new("s");

        assert!(!gate.is_configured());
        assert_eq!(
            gate.evaluate(&get("http://example.org/foo"), &mut session),
            Decision::Forward(Passthrough::Unconfigured)
        );
        assert!(!session.is_changed());
    }

    #[test]
    fn test_missing_login_url() {
        let result = Gate::from_config(&AuthConfig {
            login_redirect_url: None,
            ..config()
        });
        assert!(matches!(
            result,
            Err(GateError::MissingConfig("login_redirect_url"))
        ));
    }

    #[test]
    fn test_invalid_ignore_rule() {
        let result = Gate::builder(config())
            .ignore(IgnoreRule::path("/[broken"))
            .build();
        assert!(matches!(result, Err(GateError::Pattern(_))));
    }

    #[test]
    fn test_redirects_to_login_and_remembers_url() {
        let gate = Gate::from_config(&config()).unwrap();
        let mut session = Session::new("s");

        let decision = gate.evaluate(&get("http://example.org/foo"), &mut session);
        assert_eq!(
            decision,
            Decision::Respond(GateResponse::RedirectToLogin {
                location: LOGIN.into()
            })
        );
        assert_eq!(
            session.get(PENDING_REDIRECT_URL),
            Some(&json!("http://example.org/foo"))
        );
    }

    #[test]
    fn test_token_redirects_to_pending_url_and_consumes_it() {
        let gate = Gate::from_config(&config()).unwrap();
        let mut session = Session::new("s");
        gate.evaluate(&get("http://example.org/foo"), &mut session);

        let url = format!("http://example.org/?token={}", valid_token());
        let decision = gate.evaluate(&get(&url), &mut session);

        assert_eq!(
            decision,
            Decision::Respond(GateResponse::RedirectAfterAuth {
                location: "http://example.org/foo".into()
            })
        );
        assert!(!session.contains(PENDING_REDIRECT_URL));
        assert_eq!(session.get(USER_DATA), Some(&json!({"id": 1})));
    }

    #[test]
    fn test_token_without_pending_url_redirects_to_root() {
        let gate = Gate::from_config(&config()).unwrap();
        let mut session = Session::new("s");

        let url = format!("http://example.org/?token={}", valid_token());
        assert_eq!(
            gate.evaluate(&get(&url), &mut session),
            Decision::Respond(GateResponse::RedirectAfterAuth {
                location: "/".into()
            })
        );
    }

    #[test]
    fn test_rejected_token_leaves_session_untouched() {
        let gate = Gate::from_config(&config()).unwrap();
        let mut session = Session::new("s");
        session.insert(PENDING_REDIRECT_URL, json!("http://example.org/foo"));
        session.mark_saved();

        let decision = gate.evaluate(&get("http://example.org/?token=garbage"), &mut session);

        assert_eq!(decision, Decision::Respond(GateResponse::Rejected));
        assert!(!session.is_changed());
        assert!(!session.contains(LAST_AUTHENTICATED_AT));
    }

    #[test]
    fn test_empty_token_is_rejected() {
        let gate = Gate::from_config(&config()).unwrap();
        let mut session = Session::new("s");

        assert_eq!(
            gate.evaluate(&get("http://example.org/?token="), &mut session),
            Decision::Respond(GateResponse::Rejected)
        );
    }

    #[test]
    fn test_fake_redirect() {
        let gate = Gate::from_config(&AuthConfig {
            fake_redirect: true,
            ..config()
        })
        .unwrap();
        let mut session = Session::new("s");

        assert_eq!(
            gate.evaluate(&get("http://example.org/foo"), &mut session),
            Decision::Respond(GateResponse::FakeRedirect {
                location: LOGIN.into()
            })
        );
    }

    #[test]
    fn test_exempt_before_token() {
        let gate = Gate::builder(config())
            .ignore(IgnoreRule::path("/public*"))
            .build()
            .unwrap();
        let mut session = Session::new("s");

        let decision = gate.evaluate(&get("http://example.org/public_info?token=garbage"), &mut session);
        assert_eq!(decision, Decision::Forward(Passthrough::Exempt));
        assert!(!session.is_changed());
    }

    #[test]
    fn test_session_valid_until_timeout() {
        let clock = Arc::new(ManualClock::starting_now());
        let gate = Gate::builder(config())
            .with_clock(clock.clone())
            .build()
            .unwrap();
        let mut session = Session::new("s");

        let url = format!("http://example.org/?token={}", valid_token());
        gate.evaluate(&get(&url), &mut session);

        clock.advance(599);
        assert_eq!(
            gate.evaluate(&get("http://example.org/bar"), &mut session),
            Decision::Forward(Passthrough::SessionValid)
        );

        clock.advance(1);
        assert!(!gate
            .evaluate(&get("http://example.org/bar"), &mut session)
            .is_forward());
    }

    #[tokio::test]
    async fn test_rejected_response_body() {
        let response = GateResponse::Rejected.into_response().unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, UNAUTHORIZED_MESSAGE.as_bytes());
    }

    #[tokio::test]
    async fn test_redirect_and_fake_redirect_responses() {
        let redirect = GateResponse::RedirectToLogin {
            location: LOGIN.into(),
        }
        .into_response()
        .unwrap();
        assert_eq!(redirect.status(), StatusCode::FOUND);
        assert_eq!(redirect.headers()[LOCATION], LOGIN);

        let fake = GateResponse::FakeRedirect {
            location: LOGIN.into(),
        }
        .into_response()
        .unwrap();
        assert_eq!(fake.status(), StatusCode::OK);
        assert!(fake.headers().get(LOCATION).is_none());
        let body = fake.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, format!("Fake redirect to: {}", LOGIN).as_bytes());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Decision::Forward(Passthrough::Exempt).outcome(), "exempt");
        assert_eq!(Decision::Respond(GateResponse::Rejected).outcome(), "rejected");
    }
}
