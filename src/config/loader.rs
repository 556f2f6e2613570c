//! Configuration loader with environment variable expansion

use super::{AuthConfig, Config, ConfigError};
use std::path::Path;
use tracing::info;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse and validate configuration from YAML text
    ///
    /// `${VAR}` placeholders are expanded per string value after parsing.
    /// Without an `auth` section the gate is configured from the `JWT_*`
    /// environment variables, see [`AuthConfig::from_env`].
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Config, ConfigError> {
        let document: serde_yaml::Value = serde_yaml::from_str(content)?;
        let has_auth_section = document.get("auth").is_some();

        let mut config: Config = serde_yaml::from_value(document)?;
        if !has_auth_section {
            config.auth = AuthConfig::from_env()?;
            if config.auth.is_configured() {
                info!("No auth section, gate configured from JWT_* environment variables");
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_disables_gate() {
        std::env::remove_var("JWT_KEY");
        let config = ConfigLoader::from_str(
            r#"
server:
  address: "127.0.0.1:8080"
  upstream: "http://127.0.0.1:3000"
"#,
        )
        .unwrap();

        assert!(!config.auth.is_configured());
        assert_eq!(config.server.default_scheme, "http");
        assert_eq!(config.session.cookie_name, "sso_gate_session");
    }

    #[test]
    fn test_unresolved_signing_key_disables_gate() {
        std::env::remove_var("SSO_GATE_LOADER_TEST_KEY");
        let config = ConfigLoader::from_str(
            r#"
server:
  address: "127.0.0.1:8080"
  upstream: "http://127.0.0.1:3000"
auth:
  signing_key: "${SSO_GATE_LOADER_TEST_KEY}"
"#,
        )
        .unwrap();

        assert!(config.auth.signing_key.is_none());
    }

    #[test]
    fn test_invalid_yaml() {
        let result = ConfigLoader::from_str("server: [");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
