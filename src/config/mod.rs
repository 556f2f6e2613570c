//! Configuration module for the SSO gate
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::auth::IgnoreRule;
use crate::gate::Gate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

const PLACEHOLDER_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}";

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value (may be empty)
///
/// Runs on individual string values after YAML parsing, so substituted values
/// are taken verbatim and never expanded a second time.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
fn expand_env_vars(s: &str) -> String {
    expand(s).0
}

/// Expand placeholders, also reporting whether any stayed unresolved
fn expand(s: &str) -> (String, bool) {
    let re = match regex_lite::Regex::new(PLACEHOLDER_PATTERN) {
        Ok(re) => re,
        Err(_) => return (s.to_string(), false),
    };

    let mut unresolved = false;
    let expanded = re
        .replace_all(s, |cap: &regex_lite::Captures<'_>| {
            match std::env::var(&cap[1]) {
                Ok(val) => val,
                Err(_) => match cap.get(2) {
                    Some(default) => default.as_str().to_string(),
                    // No env var and no default. Keep the placeholder.
                    None => {
                        unresolved = true;
                        cap[0].to_string()
                    }
                },
            }
        })
        .into_owned();

    (expanded, unresolved)
}

/// Expand an optional setting
///
/// Empty results and unresolved placeholders count as "not configured".
fn expand_optional(s: &str) -> Option<String> {
    match expand(s) {
        (_, true) => None,
        (value, false) => present(value),
    }
}

/// Empty strings count as "not configured"
fn present(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Deserializer for required strings with environment variable expansion
fn deserialize_with_env<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_vars(&s))
}

/// Deserializer for optional strings with environment variable expansion
fn deserialize_optional_with_env<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    Ok(s.as_deref().and_then(expand_optional))
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Minimum length of the session cookie signing secret
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    ///
    /// Only checks the auth and session sections when a signing key is
    /// configured; without one the gate passes every request through.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.address cannot be empty".into(),
            ));
        }

        if !is_valid_http_url(&self.server.upstream) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid upstream '{}': must start with http:// or https://",
                self.server.upstream
            )));
        }

        match self.server.default_scheme.as_str() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid default_scheme '{}': must be 'http' or 'https'",
                    other
                )))
            }
        }

        if self.auth.is_configured() {
            self.auth.validate()?;

            if self.session.secret.len() < MIN_SESSION_SECRET_LEN {
                return Err(ConfigError::ValidationError(format!(
                    "session.secret must be at least {} bytes",
                    MIN_SESSION_SECRET_LEN
                )));
            }

            if self.session.cookie_name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "session.cookie_name cannot be empty".into(),
                ));
            }
        }

        if self.metrics.enabled && self.metrics.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "metrics.address cannot be empty when metrics are enabled".into(),
            ));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(deserialize_with = "deserialize_with_env")]
    pub address: String,
    /// Base URL of the protected application
    #[serde(deserialize_with = "deserialize_with_env")]
    pub upstream: String,
    /// Scheme used to rebuild request URLs when no `X-Forwarded-Proto` is sent
    #[serde(default = "default_scheme", deserialize_with = "deserialize_with_env")]
    pub default_scheme: String,
}

fn default_scheme() -> String {
    "http".to_string()
}

// ============================================================================
// Auth Configuration
// ============================================================================

/// Gate configuration
///
/// # Example
///
/// ```yaml
/// auth:
///   signing_key: "${JWT_KEY}"
///   algorithm: "HS512"
///   session_timeout_seconds: 600
///   token_param_name: "jwt_authentication_token"
///   login_redirect_url: "https://sso.example.com/request_jwt_auth?app=demo"
///   ignore:
///     - "/health"
///     - { method: "G*", path: "/public*" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret or PEM public key. Absent means the gate is disabled.
    #[serde(default, deserialize_with = "deserialize_optional_with_env")]
    pub signing_key: Option<String>,

    /// JWT algorithm name. Default: "HS512"
    #[serde(default = "default_algorithm", deserialize_with = "deserialize_with_env")]
    pub algorithm: String,

    /// Sliding authentication window. Default: 600
    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: u64,

    /// Request parameter carrying the token. Default: "jwt_authentication_token"
    #[serde(
        default = "default_token_param_name",
        deserialize_with = "deserialize_with_env"
    )]
    pub token_param_name: String,

    /// Where unauthenticated clients are sent
    #[serde(default, deserialize_with = "deserialize_optional_with_env")]
    pub login_redirect_url: Option<String>,

    /// Requests that bypass the gate
    #[serde(default)]
    pub ignore: Vec<IgnoreRule>,

    /// Answer 200 with the login URL instead of redirecting. For tests only.
    #[serde(default)]
    pub fake_redirect: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            algorithm: default_algorithm(),
            session_timeout_seconds: default_session_timeout(),
            token_param_name: default_token_param_name(),
            login_redirect_url: None,
            ignore: Vec::new(),
            fake_redirect: false,
        }
    }
}

fn default_algorithm() -> String {
    "HS512".to_string()
}

fn default_session_timeout() -> u64 {
    600
}

fn default_token_param_name() -> String {
    // Must be a name no application would use for its own parameters
    "jwt_authentication_token".to_string()
}

impl AuthConfig {
    /// True when a signing key is present and the gate is active
    pub fn is_configured(&self) -> bool {
        self.signing_key.is_some()
    }

    /// Build the auth section from the `JWT_*` environment variables
    ///
    /// The loader falls back to this when the YAML file has no `auth`
    /// section.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `JWT_KEY` | `signing_key` |
    /// | `JWT_ALGORITHM` | `algorithm` |
    /// | `JWT_SESSION_TIMEOUT_IN_SECONDS` | `session_timeout_seconds` |
    /// | `JWT_PARAM_NAME` | `token_param_name` |
    /// | `JWT_PARAM_MISSING_REDIRECT_URL` | `login_redirect_url` |
    /// | `JWT_FAKE_REDIRECT` | `fake_redirect` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &str| std::env::var(name).ok().and_then(present);
        let defaults = Self::default();

        let session_timeout_seconds = match var("JWT_SESSION_TIMEOUT_IN_SECONDS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "JWT_SESSION_TIMEOUT_IN_SECONDS must be a positive integer, got '{}'",
                    raw
                ))
            })?,
            None => defaults.session_timeout_seconds,
        };

        let fake_redirect = var("JWT_FAKE_REDIRECT")
            .map(|raw| matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            signing_key: var("JWT_KEY"),
            algorithm: var("JWT_ALGORITHM").unwrap_or(defaults.algorithm),
            session_timeout_seconds,
            token_param_name: var("JWT_PARAM_NAME").unwrap_or(defaults.token_param_name),
            login_redirect_url: var("JWT_PARAM_MISSING_REDIRECT_URL"),
            ignore: Vec::new(),
            fake_redirect,
        })
    }

    /// Check that an active gate has everything it needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_configured() {
            return Ok(());
        }

        if let Some(ref url) = self.login_redirect_url {
            if !is_valid_http_url(url) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid login_redirect_url '{}': must start with http:// or https://",
                    url
                )));
            }
        }

        Gate::from_config(self)
            .map(|_| ())
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Session cookie and store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cookie name. Default: "sso_gate_session"
    #[serde(default = "default_cookie_name", deserialize_with = "deserialize_with_env")]
    pub cookie_name: String,

    /// HMAC key for signing the cookie. Supports ${VAR} expansion.
    #[serde(default, deserialize_with = "deserialize_with_env")]
    pub secret: String,

    /// Idle lifetime of a stored session. Default: 86400
    #[serde(default = "default_session_lifetime")]
    pub lifetime_seconds: u64,

    /// Mark the cookie `Secure`. Default: false
    #[serde(default)]
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secret: String::new(),
            lifetime_seconds: default_session_lifetime(),
            secure: false,
        }
    }
}

fn default_cookie_name() -> String {
    "sso_gate_session".to_string()
}

fn default_session_lifetime() -> u64 {
    86400
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(
        default = "default_metrics_address",
        deserialize_with = "deserialize_with_env"
    )]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:0".into(),
                upstream: "http://127.0.0.1:3000".into(),
                default_scheme: default_scheme(),
            },
            auth: AuthConfig {
                signing_key: Some("test".repeat(20)),
                login_redirect_url: Some("http://example.com/request_jwt_auth?app=demo".into()),
                ..Default::default()
            },
            session: SessionConfig {
                secret: "s".repeat(32),
                ..Default::default()
            },
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_auth_defaults() {
        let auth = AuthConfig::default();
        assert_eq!(auth.algorithm, "HS512");
        assert_eq!(auth.session_timeout_seconds, 600);
        assert_eq!(auth.token_param_name, "jwt_authentication_token");
        assert!(!auth.is_configured());
        assert!(!auth.fake_redirect);
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_unconfigured_gate_needs_no_login_url() {
        let mut config = test_config();
        config.auth = AuthConfig::default();
        config.session.secret = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_login_url_rejected() {
        let mut config = test_config();
        config.auth.login_redirect_url = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_login_url_rejected() {
        let mut config = test_config();
        config.auth.login_redirect_url = Some("ftp://example.com".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = test_config();
        config.auth.session_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let mut config = test_config();
        config.auth.algorithm = "none".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_session_secret_rejected() {
        let mut config = test_config();
        config.session.secret = "short".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_upstream_rejected() {
        let mut config = test_config();
        config.server.upstream = "localhost:3000".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_with_empty_default() {
        std::env::remove_var("SSO_GATE_TEST_UNSET_VAR");
        assert_eq!(expand_env_vars("${SSO_GATE_TEST_UNSET_VAR:-}"), "");
        assert_eq!(
            expand_env_vars("${SSO_GATE_TEST_UNSET_VAR}"),
            "${SSO_GATE_TEST_UNSET_VAR}"
        );
    }

    #[test]
    fn test_expand_optional_normalization() {
        std::env::remove_var("SSO_GATE_TEST_UNSET_VAR");
        assert_eq!(expand_optional("key"), Some("key".into()));
        assert_eq!(expand_optional(""), None);
        assert_eq!(expand_optional("  "), None);
        assert_eq!(expand_optional("${SSO_GATE_TEST_UNSET_VAR}"), None);
        assert_eq!(expand_optional("${SSO_GATE_TEST_UNSET_VAR:-}"), None);
        assert_eq!(
            expand_optional("${SSO_GATE_TEST_UNSET_VAR:-fallback}"),
            Some("fallback".into())
        );
    }

    #[test]
    fn test_expanded_value_is_not_expanded_again() {
        std::env::set_var("SSO_GATE_TEST_NESTED_VAR", "literal-${HOME}");
        assert_eq!(
            expand_optional("${SSO_GATE_TEST_NESTED_VAR}"),
            Some("literal-${HOME}".into())
        );
        std::env::remove_var("SSO_GATE_TEST_NESTED_VAR");
    }
}
