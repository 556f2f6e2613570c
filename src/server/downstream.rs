//! Downstream application
//!
//! The protected application is an opaque request handler. [`UpstreamProxy`]
//! forwards to an HTTP service; tests plug in their own handlers.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::HOST;
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

/// Downstream errors
#[derive(Error, Debug)]
pub enum DownstreamError {
    #[error("Invalid upstream URL: {0}")]
    InvalidUpstream(String),

    #[error("Upstream request failed: {0}")]
    Request(String),

    #[error("Failed to read upstream response: {0}")]
    Body(String),
}

/// The application behind the gate
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn call(&self, request: Request<Full<Bytes>>)
        -> Result<Response<Full<Bytes>>, DownstreamError>;
}

/// Reverse proxy to an HTTP upstream
///
/// # Example
///
/// ```
/// use sso_gate::server::UpstreamProxy;
///
/// let proxy = UpstreamProxy::new("http://127.0.0.1:3000").unwrap();
/// assert_eq!(proxy.upstream().host(), Some("127.0.0.1"));
/// ```
pub struct UpstreamProxy {
    upstream: Uri,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl UpstreamProxy {
    pub fn new(upstream: &str) -> Result<Self, DownstreamError> {
        let upstream: Uri = upstream
            .parse()
            .map_err(|e| DownstreamError::InvalidUpstream(format!("{}: {}", upstream, e)))?;

        if upstream.scheme().is_none() || upstream.authority().is_none() {
            return Err(DownstreamError::InvalidUpstream(format!(
                "{}: must be absolute",
                upstream
            )));
        }

        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self { upstream, client })
    }

    pub fn upstream(&self) -> &Uri {
        &self.upstream
    }

    /// Map a request target onto the upstream base URL
    fn target(&self, uri: &Uri) -> Result<Uri, DownstreamError> {
        let base = self.upstream.path().trim_end_matches('/');
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

        let mut builder = Uri::builder().path_and_query(format!("{}{}", base, path_and_query));
        if let Some(scheme) = self.upstream.scheme() {
            builder = builder.scheme(scheme.clone());
        }
        if let Some(authority) = self.upstream.authority() {
            builder = builder.authority(authority.clone());
        }
        builder
            .build()
            .map_err(|e| DownstreamError::InvalidUpstream(e.to_string()))
    }
}

#[async_trait]
impl Downstream for UpstreamProxy {
    async fn call(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Full<Bytes>>, DownstreamError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = self.target(&parts.uri)?;
        // Keep the client's Host when it sent one
        if !parts.headers.contains_key(HOST) {
            if let Some(authority) = self.upstream.authority() {
                if let Ok(value) = authority.as_str().parse() {
                    parts.headers.insert(HOST, value);
                }
            }
        }

        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .map_err(|e| DownstreamError::Request(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| DownstreamError::Body(e.to_string()))?
            .to_bytes();

        Ok(Response::from_parts(parts, Full::new(body)))
    }
}
