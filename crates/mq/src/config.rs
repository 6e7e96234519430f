//! Environment-driven broker configuration.
//!
//! Every knob has a default suitable for local development; `CHATLINK_*`
//! variables override individual fields. Unparsable values fall back to the
//! default with a warning instead of aborting startup.

use {std::fmt::Display, std::str::FromStr, std::time::Duration, tracing::warn};

use crate::INSTRUCTION_QUEUE;

/// Transport configuration shared by callers and the worker.
#[derive(Debug, Clone)]
pub struct MqConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub heartbeat: Duration,
    pub blocked_timeout: Duration,
    /// Durable shared queue instructions are published to.
    pub request_queue: String,
    /// Attempt bound for connect and publish.
    pub max_retries: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
    /// Upper bound on waiting for a correlated reply before the call fails
    /// with a connectivity error.
    pub reply_timeout: Duration,
}

impl Default for MqConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5672,
            username: "guest".into(),
            password: "guest".into(),
            heartbeat: Duration::from_secs(600),
            blocked_timeout: Duration::from_secs(300),
            request_queue: INSTRUCTION_QUEUE.into(),
            max_retries: 5,
            retry_delay: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(30),
        }
    }
}

impl MqConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_string("CHATLINK_BROKER_HOST", defaults.host),
            port: env_parsed("CHATLINK_BROKER_PORT", defaults.port),
            username: env_string("CHATLINK_BROKER_USERNAME", defaults.username),
            password: env_string("CHATLINK_BROKER_PASSWORD", defaults.password),
            heartbeat: env_secs("CHATLINK_BROKER_HEARTBEAT_SECS", defaults.heartbeat),
            blocked_timeout: env_secs(
                "CHATLINK_BROKER_BLOCKED_TIMEOUT_SECS",
                defaults.blocked_timeout,
            ),
            request_queue: env_string("CHATLINK_REQUEST_QUEUE", defaults.request_queue),
            max_retries: env_parsed("CHATLINK_MAX_RETRIES", defaults.max_retries),
            retry_delay: env_secs("CHATLINK_RETRY_DELAY_SECS", defaults.retry_delay),
            reply_timeout: env_secs("CHATLINK_REPLY_TIMEOUT_SECS", defaults.reply_timeout),
        }
    }

    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            heartbeat: self.heartbeat,
            blocked_timeout: self.blocked_timeout,
        }
    }
}

/// Per-connection parameters presented to the broker.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub heartbeat: Duration,
    pub blocked_timeout: Duration,
}

fn env_string(name: &str, default: String) -> String {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => default,
    }
}

fn env_parsed<T: FromStr + Display>(name: &str, default: T) -> T {
    parse_or(name, std::env::var(name).ok(), default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_or(name, std::env::var(name).ok(), default.as_secs()))
}

fn parse_or<T: FromStr + Display>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(%name, %raw, %default, "unparsable configuration value, using default");
                default
            }
        },
    }
}
