//! HTTP server module
//!
//! Accepts connections, collects each request body and hands the request to
//! the [`GateService`].
//!
//! # Example
//!
//! ```no_run
//! use sso_gate::config::Config;
//! use sso_gate::server::Server;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let server = Server::new(config).await?;
//! println!("Gate listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

mod downstream;
mod handler;

pub use downstream::{Downstream, DownstreamError, UpstreamProxy};
pub use handler::GateService;

use crate::config::Config;
use crate::gate::{Gate, GateError};
use crate::session::{InMemorySessionStore, SessionCookie};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// How often expired sessions are swept from the in-memory store
const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Gate configuration error: {0}")]
    Gate(#[from] GateError),

    #[error("Downstream configuration error: {0}")]
    Downstream(#[from] DownstreamError),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// HTTP server fronting the protected application
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    service: Arc<GateService>,
    store: Option<Arc<InMemorySessionStore>>,
}

impl Server {
    /// Build the gate, session store and upstream proxy from configuration
    /// and bind the listener
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let gate = Gate::from_config(&config.auth)?;
        let store = Arc::new(InMemorySessionStore::new(config.session.lifetime_seconds));
        let cookie = SessionCookie::new(&config.session.cookie_name, &config.session.secret)
            .secure(config.session.secure);
        let downstream = Arc::new(UpstreamProxy::new(&config.server.upstream)?);

        if gate.is_configured() {
            info!(upstream = %config.server.upstream, "Gate enabled: {:?}", gate);
        } else {
            warn!("No signing key configured, all requests pass through unauthenticated");
        }

        let service = GateService::new(gate, store.clone(), cookie, downstream)
            .with_default_scheme(&config.server.default_scheme);

        let mut server = Self::bind(&config.server.address, service).await?;
        server.store = Some(store);
        Ok(server)
    }

    /// Bind a listener for an already assembled service
    pub async fn bind(address: &str, service: GateService) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        // Port 0 resolves to the OS-assigned port here
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            service: Arc::new(service),
            store: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Serve until `shutdown` completes
    ///
    /// Each connection runs in its own task; accept errors are logged and do
    /// not stop the server.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting gate on {}", self.local_addr);

        let pruner = self.store.clone().map(|store| {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(SESSION_PRUNE_INTERVAL);
                loop {
                    interval.tick().await;
                    let pruned = store.prune_expired();
                    if pruned > 0 {
                        debug!(pruned, "Pruned expired sessions");
                    }
                }
            })
        });

        tokio::pin!(shutdown);
        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let handler = service_fn(move |req| {
                    let service = Arc::clone(&service);
                    async move { handle_request(req, service).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }

        if let Some(pruner) = pruner {
            pruner.abort();
        }
        info!("Shutting down gate");
        Ok(())
    }
}

/// Collect the body and run the gate
async fn handle_request(
    req: Request<Incoming>,
    service: Arc<GateService>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            let mut response = Response::new(Full::new(Bytes::from_static(b"Bad Request")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    Ok(service.handle(Request::from_parts(parts, body)).await)
}
