//! Application configuration loaded from environment variables.

use std::path::PathBuf;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:8000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: Postgres connection string; the in-memory store is used when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default `10`)
/// - `JWT_PRIVATE_KEY_PATH`, `JWT_PUBLIC_KEY_PATH`: RSA PEM files for token signing
/// - `NATS_URL`: event bus; order events are dropped when unset
/// - `ORDER_EVENTS_SUBJECT`: subject for order events (default `order-events`)
/// - `EVENT_CONSUMER_ENABLED`: run the logging consumer (default `true`)
/// - `COOKIE_SECURE`: mark session cookies `Secure` (default `false`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_private_key_path: PathBuf,
    pub jwt_public_key_path: PathBuf,
    pub nats_url: Option<String>,
    pub order_events_subject: String,
    pub event_consumer_enabled: bool,
    pub cookie_secure: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: var("DATABASE_URL"),
            database_max_connections: var("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            jwt_private_key_path: var("JWT_PRIVATE_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.jwt_private_key_path),
            jwt_public_key_path: var("JWT_PUBLIC_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.jwt_public_key_path),
            nats_url: var("NATS_URL"),
            order_events_subject: var("ORDER_EVENTS_SUBJECT")
                .unwrap_or(defaults.order_events_subject),
            event_consumer_enabled: var("EVENT_CONSUMER_ENABLED")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.event_consumer_enabled),
            cookie_secure: var("COOKIE_SECURE")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.cookie_secure),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            jwt_private_key_path: PathBuf::from("certs/jwt-private.pem"),
            jwt_public_key_path: PathBuf::from("certs/jwt-public.pem"),
            nats_url: None,
            order_events_subject: "order-events".to_string(),
            event_consumer_enabled: true,
            cookie_secure: false,
        }
    }
}
