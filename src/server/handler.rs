//! Per-request handling
//!
//! Binds the gate to HTTP: loads the client's session, evaluates the request,
//! persists session changes and either forwards to the downstream application
//! or answers on its own.

use super::downstream::Downstream;
use crate::gate::{Decision, Gate, GateRequest};
use crate::metrics;
use crate::session::{Session, SessionCookie, SessionStore};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE, SET_COOKIE};
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error};

/// The gate wired to a session store and a downstream application
pub struct GateService {
    gate: Gate,
    sessions: Arc<dyn SessionStore>,
    cookie: SessionCookie,
    downstream: Arc<dyn Downstream>,
    default_scheme: String,
}

impl GateService {
    pub fn new(
        gate: Gate,
        sessions: Arc<dyn SessionStore>,
        cookie: SessionCookie,
        downstream: Arc<dyn Downstream>,
    ) -> Self {
        Self {
            gate,
            sessions,
            cookie,
            downstream,
            default_scheme: "http".to_string(),
        }
    }

    /// Scheme used to rebuild request URLs without `X-Forwarded-Proto`
    #[must_use]
    pub fn with_default_scheme(mut self, scheme: &str) -> Self {
        self.default_scheme = scheme.to_string();
        self
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Handle one request with its fully collected body
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Full<Bytes>> {
        let gate_request = GateRequest::from_http(&request, request.body(), &self.default_scheme);
        let cookie_id = self.cookie.session_id(request.headers());

        // Disabled gates never touch the session store
        let mut session = if self.gate.is_configured() {
            match self.load_session(cookie_id.as_deref()) {
                Ok(session) => session,
                Err(response) => return response,
            }
        } else {
            Session::generate()
        };

        let decision = self.gate.evaluate(&gate_request, &mut session);
        metrics::record_decision(decision.outcome());
        debug!(
            method = %gate_request.method,
            path = %gate_request.path,
            outcome = decision.outcome(),
            "Request evaluated"
        );

        let mut set_cookie = None;
        if session.is_changed() {
            if let Err(e) = self.sessions.save(&session) {
                error!("Failed to save session: {}", e);
                metrics::record_error("session_store");
                return failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
            }
            if cookie_id.as_deref() != Some(session.id()) {
                set_cookie = Some(self.cookie.set_cookie(session.id()));
            }
        }

        let mut response = match decision {
            Decision::Forward(_) => match self.downstream.call(request.map(Full::new)).await {
                Ok(response) => response,
                Err(e) => {
                    error!(path = %gate_request.path, "Downstream request failed: {}", e);
                    metrics::record_error("downstream");
                    return failure(StatusCode::BAD_GATEWAY, "Bad Gateway");
                }
            },
            Decision::Respond(answer) => match answer.into_response() {
                Ok(response) => response,
                Err(e) => {
                    error!("Failed to build gate response: {}", e);
                    metrics::record_error("response");
                    return failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
                }
            },
        };

        if let Some(cookie) = set_cookie {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => error!("Invalid session cookie header: {}", e),
            }
        }

        response
    }

    /// Load the client's session or start a new one
    fn load_session(&self, cookie_id: Option<&str>) -> Result<Session, Response<Full<Bytes>>> {
        let Some(id) = cookie_id else {
            return Ok(Session::generate());
        };

        match self.sessions.load(id) {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Ok(Session::generate()),
            Err(e) => {
                error!("Failed to load session: {}", e);
                metrics::record_error("session_store");
                Err(failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                ))
            }
        }
    }
}

fn failure(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
