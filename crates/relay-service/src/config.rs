//! Relay configuration.
//!
//! Configuration is loaded from environment variables. The JWT secret is
//! redacted in Debug output.

use axum::http::HeaderValue;
use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default browser origin allowed by CORS.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:5500";

/// Default per-connection outbound mailbox size.
pub const DEFAULT_CONNECTION_BUFFER: usize = crate::actors::DEFAULT_CONNECTION_BUFFER;

/// HS256 keys shorter than this are accepted but reported at startup.
pub const RECOMMENDED_SECRET_BYTES: usize = 32;

/// Relay configuration.
#[derive(Clone)]
pub struct Config {
    /// Shared HS256 secret used to verify credentials.
    pub jwt_secret: SecretString,

    /// Listener address for HTTP and WebSocket traffic.
    pub bind_address: String,

    /// Single browser origin allowed by CORS.
    pub cors_allowed_origin: String,

    /// Close the older connection when an identity reconnects.
    pub close_superseded: bool,

    /// Outbound mailbox size per connection.
    pub connection_buffer: usize,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("cors_allowed_origin", &self.cors_allowed_origin)
            .field("close_superseded", &self.close_superseded)
            .field("connection_buffer", &self.connection_buffer)
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// - `MissingEnvVar` - `RELAY_JWT_SECRET` is not set
    /// - `InvalidValue` - a set variable does not parse for its type
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwt_secret = vars
            .get("RELAY_JWT_SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("RELAY_JWT_SECRET".to_string()))?;
        if jwt_secret.is_empty() {
            return Err(ConfigError::InvalidValue(
                "RELAY_JWT_SECRET must not be empty".to_string(),
            ));
        }
        let jwt_secret = SecretString::from(jwt_secret.clone());

        let bind_address = vars
            .get("RELAY_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        if bind_address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "RELAY_BIND_ADDRESS is not a socket address: {bind_address}"
            )));
        }

        let cors_allowed_origin = vars
            .get("RELAY_CORS_ALLOWED_ORIGIN")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CORS_ALLOWED_ORIGIN.to_string());
        if HeaderValue::from_str(&cors_allowed_origin).is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "RELAY_CORS_ALLOWED_ORIGIN is not a valid header value: {cors_allowed_origin}"
            )));
        }

        let close_superseded = parse_bool(vars, "RELAY_CLOSE_SUPERSEDED", false)?;
        let json_logs = parse_bool(vars, "RELAY_JSON_LOGS", false)?;

        let connection_buffer: usize =
            parse_var(vars, "RELAY_CONNECTION_BUFFER", DEFAULT_CONNECTION_BUFFER)?;
        if connection_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "RELAY_CONNECTION_BUFFER must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            jwt_secret,
            bind_address,
            cors_allowed_origin,
            close_superseded,
            connection_buffer,
            json_logs,
        })
    }

    /// Whether the secret is shorter than [`RECOMMENDED_SECRET_BYTES`].
    #[must_use]
    pub fn secret_is_weak(&self) -> bool {
        self.jwt_secret.expose_secret().len() < RECOMMENDED_SECRET_BYTES
    }
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}: {raw}"))),
        None => Ok(default),
    }
}

fn parse_bool(
    vars: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(format!("{key}: {v}"))),
        },
    }
}
