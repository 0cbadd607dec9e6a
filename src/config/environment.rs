// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, deployment modes, and runtime configuration parsing
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Environment-based configuration management for production deployment

use super::store::kv_config_from_env;
use crate::constants::{oauth, sse};
use crate::errors::{AppError, AppResult};
use crate::store::KvConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::{self, Display};
use std::str::FromStr;
use tracing::info;
use url::Url;

/// Default HTTP port
const DEFAULT_HTTP_PORT: u16 = 8081;
/// Default bind address
const DEFAULT_HOST: &str = "127.0.0.1";
/// Default client id accepted by the authorization server
const DEFAULT_CLIENT_ID: &str = "mcp-client";
/// Header the host forum sets with the logged-in user id
const DEFAULT_SESSION_HEADER: &str = "x-forum-user-id";
/// Default cleanup sweep period
const DEFAULT_TOKEN_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Strongly typed log level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Operational messages
    #[default]
    Info,
    /// Diagnostic detail
    Debug,
    /// Everything
    Trace,
}

impl LogLevel {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        })
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Testing => "testing",
        })
    }
}

/// Authorization server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthServerConfig {
    /// Public origin; issuer and base of every advertised endpoint
    pub issuer_url: String,
    /// The single client id accepted for device and code grants
    pub client_id: String,
    /// Redirect URIs the code flow may send codes to
    pub redirect_uris: Vec<String>,
    /// Device authorization lifetime in seconds
    pub device_code_ttl_secs: u64,
    /// Initial device polling interval in seconds
    pub device_poll_interval_secs: u64,
}

impl OAuthServerConfig {
    /// Settings for an issuer with defaults for everything else
    #[must_use]
    pub fn with_issuer(issuer_url: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            redirect_uris: Vec::new(),
            device_code_ttl_secs: oauth::DEVICE_CODE_TTL_SECS,
            device_poll_interval_secs: oauth::DEVICE_POLL_INTERVAL_SECS,
        }
    }

    /// Page where users enter device user codes
    #[must_use]
    pub fn verification_uri(&self) -> String {
        format!("{}/oauth/device", self.issuer_url)
    }

    /// RFC 8628 device authorization endpoint
    #[must_use]
    pub fn device_authorization_endpoint(&self) -> String {
        format!("{}/oauth/device_authorization", self.issuer_url)
    }

    /// Token endpoint
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth/token", self.issuer_url)
    }

    /// Authorization endpoint for the redirect flow
    #[must_use]
    pub fn authorization_endpoint(&self) -> String {
        format!("{}/oauth/authorize", self.issuer_url)
    }

    /// RFC 7009 revocation endpoint
    #[must_use]
    pub fn revocation_endpoint(&self) -> String {
        format!("{}/oauth/revoke", self.issuer_url)
    }

    /// JWKS document location
    #[must_use]
    pub fn jwks_uri(&self) -> String {
        format!("{}/.well-known/jwks.json", self.issuer_url)
    }
}

/// Server-sent event stream limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SseConfig {
    /// Connections allowed across all users
    pub max_connections: usize,
    /// Connections allowed per user
    pub max_connections_per_user: usize,
    /// Heartbeat period in seconds
    pub ping_interval_secs: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            max_connections: sse::DEFAULT_MAX_CONNECTIONS,
            max_connections_per_user: sse::DEFAULT_MAX_CONNECTIONS_PER_USER,
            ping_interval_secs: sse::PING_INTERVAL_SECS,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Bind address
    pub host: String,
    /// Deployment environment
    pub environment: Environment,
    /// Log level
    pub log_level: LogLevel,
    /// Authorization server settings
    pub oauth: OAuthServerConfig,
    /// SSE limits
    pub sse: SseConfig,
    /// Key-value backend
    pub kv: KvConfig,
    /// Trusted header carrying the host-forum session user
    pub session_header: String,
    /// Cleanup sweep period in seconds
    pub token_cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            host: DEFAULT_HOST.to_owned(),
            environment: Environment::default(),
            log_level: LogLevel::default(),
            oauth: OAuthServerConfig::with_issuer(format!("http://localhost:{DEFAULT_HTTP_PORT}")),
            sse: SseConfig::default(),
            kv: KvConfig::default(),
            session_header: DEFAULT_SESSION_HEADER.to_owned(),
            token_cleanup_interval_secs: DEFAULT_TOKEN_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that does not parse
    pub fn from_env() -> AppResult<Self> {
        info!("Loading configuration from environment variables");

        let http_port: u16 = env_parse("HTTP_PORT", DEFAULT_HTTP_PORT)?;
        let base_url = env_var_opt("BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{http_port}"))
            .trim_end_matches('/')
            .to_owned();

        let config = Self {
            http_port,
            host: env_var_or("HOST", DEFAULT_HOST),
            environment: Environment::from_str_or_default(&env_var_or(
                "ENVIRONMENT",
                "development",
            )),
            log_level: LogLevel::from_str_or_default(&env_var_or("RUST_LOG", "info")),
            oauth: OAuthServerConfig {
                issuer_url: base_url,
                client_id: env_var_or("MCP_OAUTH_CLIENT_ID", DEFAULT_CLIENT_ID),
                redirect_uris: parse_list(&env_var_or("MCP_OAUTH_REDIRECT_URIS", "")),
                device_code_ttl_secs: env_parse(
                    "MCP_DEVICE_CODE_TTL_SECS",
                    oauth::DEVICE_CODE_TTL_SECS,
                )?,
                device_poll_interval_secs: env_parse(
                    "MCP_DEVICE_POLL_INTERVAL_SECS",
                    oauth::DEVICE_POLL_INTERVAL_SECS,
                )?,
            },
            sse: SseConfig {
                max_connections: env_parse("MCP_SSE_MAX_CONNECTIONS", sse::DEFAULT_MAX_CONNECTIONS)?,
                max_connections_per_user: env_parse(
                    "MCP_SSE_MAX_PER_USER",
                    sse::DEFAULT_MAX_CONNECTIONS_PER_USER,
                )?,
                ping_interval_secs: sse::PING_INTERVAL_SECS,
            },
            kv: kv_config_from_env()?,
            session_header: env_var_or("MCP_SESSION_HEADER", DEFAULT_SESSION_HEADER)
                .to_lowercase(),
            token_cleanup_interval_secs: env_parse(
                "TOKEN_CLEANUP_INTERVAL_SECS",
                DEFAULT_TOKEN_CLEANUP_INTERVAL_SECS,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the server unusable
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending setting
    pub fn validate(&self) -> AppResult<()> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(AppError::config("MCP_OAUTH_CLIENT_ID must not be empty"));
        }
        if self.oauth.device_code_ttl_secs == 0 {
            return Err(AppError::config("MCP_DEVICE_CODE_TTL_SECS must be positive"));
        }
        if self.oauth.device_poll_interval_secs > oauth::MAX_POLL_INTERVAL_SECS {
            return Err(AppError::config(format!(
                "MCP_DEVICE_POLL_INTERVAL_SECS must not exceed {}",
                oauth::MAX_POLL_INTERVAL_SECS
            )));
        }
        if self.sse.max_connections_per_user > self.sse.max_connections {
            return Err(AppError::config(
                "MCP_SSE_MAX_PER_USER must not exceed MCP_SSE_MAX_CONNECTIONS",
            ));
        }
        if Url::parse(&self.oauth.issuer_url).is_err() {
            return Err(AppError::config(format!(
                "BASE_URL '{}' is not an absolute URL",
                self.oauth.issuer_url
            )));
        }
        Ok(())
    }

    /// Get a summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "MCP Device Gateway Configuration:\n\
             - Bind: {}:{}\n\
             - Environment: {}\n\
             - Log Level: {}\n\
             - Issuer: {}\n\
             - Client ID: {}\n\
             - Redirect URIs: {}\n\
             - Device Code TTL: {}s (poll interval {}s)\n\
             - Key-Value Backend: {}\n\
             - SSE Limits: {} total / {} per user",
            self.host,
            self.http_port,
            self.environment,
            self.log_level,
            self.oauth.issuer_url,
            self.oauth.client_id,
            self.oauth.redirect_uris.len(),
            self.oauth.device_code_ttl_secs,
            self.oauth.device_poll_interval_secs,
            if self.kv.redis_url.is_some() {
                "Redis"
            } else {
                "In-memory"
            },
            self.sse.max_connections,
            self.sse.max_connections_per_user,
        )
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Non-empty environment variable
pub(crate) fn env_var_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an environment variable, failing on malformed values
pub(crate) fn env_parse<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    env_var_opt(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e| AppError::config(format!("Invalid {key} value '{raw}': {e}")))
    })
}

/// Parse comma-separated values
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}
