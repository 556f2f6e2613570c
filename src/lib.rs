//! SSO Gate Library
//!
//! JWT single-sign-on gate that sits in front of an arbitrary HTTP
//! application.
//!
//! # Features
//!
//! - **Token login**: Accepts a signed JWT in a request parameter and turns
//!   it into a session
//! - **Sliding timeout**: Sessions stay authenticated while the client keeps
//!   re-authenticating within the window
//! - **Ignore rules**: Glob patterns over method and path bypass the gate
//! - **Transparent when unconfigured**: Without a signing key every request
//!   passes through untouched
//!
//! # Example
//!
//! ```no_run
//! use sso_gate::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod clock;
pub mod config;
pub mod gate;
pub mod metrics;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use gate::{Decision, Gate, GateRequest};
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
