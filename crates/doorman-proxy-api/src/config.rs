//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use doorman_proxy_core::HttpSourceOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Remote configuration source holding policies and releases
    pub source: SourceConfig,

    /// Administrative account for Basic authentication
    pub admin: AdminConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Check that every required setting is present and usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.source.validate()?;
        self.admin.validate()
    }

    /// Apply the flat `DPROXY_*` variables used by earlier deployments
    ///
    /// Values found through `lookup` override whatever the layered
    /// configuration produced. Empty values are ignored.
    pub fn apply_flat_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(uri) = var("DPROXY_SOURCE_URI") {
            self.source.uri = uri;
        }
        if let Some(user) = var("DPROXY_SOURCE_USER") {
            self.source.user = user;
        }
        if let Some(password) = var("DPROXY_SOURCE_PASSWORD") {
            self.source.password = password;
        }
        if let Some(skip) = var("DPROXY_SOURCE_INSECURE_SKIP_VERIFY") {
            // Unparseable values keep verification on.
            self.source.insecure_skip_verify = parse_bool(&skip).unwrap_or(false);
        }
        if var("DPROXY_LOGGING").is_some() {
            self.logging.request_logging = true;
        }
    }
}

/// Accepts the literals understood by the `DPROXY_*` flags
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Seconds to drain open connections after a shutdown signal
    pub shutdown_timeout_seconds: u64,
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "server.host".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

/// Connection settings for the configuration source
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URI of the source service
    pub uri: String,

    pub user: String,

    pub password: String,

    /// Accept invalid TLS certificates from the source
    pub insecure_skip_verify: bool,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
}

impl SourceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("source.uri", &self.uri),
            ("source.user", &self.user),
            ("source.password", &self.password),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing {
                    key: key.to_string(),
                });
            }
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "source.timeout_seconds must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Client options derived from these settings
    pub fn client_options(&self) -> HttpSourceOptions {
        HttpSourceOptions {
            insecure_skip_verify: self.insecure_skip_verify,
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            user: String::new(),
            password: String::new(),
            insecure_skip_verify: false,
            timeout_seconds: 60,
        }
    }
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<REDACTED>")
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// Administrative account
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub user: String,
    pub password: String,
}

impl AdminConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.user.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "admin.user".to_string(),
            });
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing {
                key: "admin.password".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("user", &self.user)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,

    /// Log every HTTP request with its status and duration
    pub request_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            request_logging: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
