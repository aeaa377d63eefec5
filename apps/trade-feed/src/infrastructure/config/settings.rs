//! Client Configuration Settings
//!
//! Settings for the trade feed client, loaded from environment variables.
//! Loading goes through an injectable lookup so tests never touch the
//! process environment.

use std::str::FromStr;
use std::time::Duration;

use crate::domain::account::UserId;
use crate::domain::connection::DEFAULT_MAX_ATTEMPTS;
use crate::domain::feed::FEED_CAPACITY;
use crate::infrastructure::http::HttpConfig;
use crate::infrastructure::stomp::{ConnectionConfig, HeartbeatConfig, RetryConfig};

/// STOMP broker credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StompCredentials {
    login: Option<String>,
    passcode: Option<String>,
}

impl StompCredentials {
    /// Create credentials.
    #[must_use]
    pub const fn new(login: Option<String>, passcode: Option<String>) -> Self {
        Self { login, passcode }
    }

    /// Login, if configured.
    #[must_use]
    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    /// Passcode, if configured.
    #[must_use]
    pub fn passcode(&self) -> Option<&str> {
        self.passcode.as_deref()
    }
}

impl std::fmt::Debug for StompCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StompCredentials")
            .field("login", &self.login)
            .field("passcode", &self.passcode.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Push transport settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket endpoint.
    pub url: String,
    /// STOMP `host` header override.
    pub host: Option<String>,
    /// Broker credentials.
    pub credentials: StompCredentials,
    /// Fixed delay before each reconnect.
    pub reconnect_delay: Duration,
    /// Outgoing heart-beat interval (0 disables).
    pub heartbeat_outgoing: Duration,
    /// Incoming heart-beat interval (0 disables).
    pub heartbeat_incoming: Duration,
    /// Consecutive protocol faults before FAILED.
    pub max_reconnect_attempts: u32,
    /// Connect and `CONNECTED` deadline.
    pub handshake_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws/websocket".to_string(),
            host: None,
            credentials: StompCredentials::default(),
            reconnect_delay: Duration::from_millis(5000),
            heartbeat_outgoing: Duration::from_millis(4000),
            heartbeat_incoming: Duration::from_millis(4000),
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// REST backend settings.
#[derive(Clone)]
pub struct ApiSettings {
    /// Base URL.
    pub base_url: String,
    /// Bearer token.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSettings")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// User whose portfolio and orders are shown.
    pub user_id: UserId,
    /// Push transport.
    pub stream: StreamSettings,
    /// REST backend.
    pub api: ApiSettings,
    /// Feed buffer capacity.
    pub feed_capacity: usize,
    /// Status server port (0 = disabled).
    pub status_port: u16,
}

impl DashboardConfig {
    /// Create configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or any value is
    /// empty or unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`DashboardConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let stream_defaults = StreamSettings::default();
        let api_defaults = ApiSettings::default();

        let user_id = UserId::new(env.required("TRADE_FEED_USER_ID")?);

        let stream = StreamSettings {
            url: env.string("TRADE_FEED_WS_URL")?.unwrap_or(stream_defaults.url),
            host: env.string("TRADE_FEED_STOMP_HOST")?,
            credentials: StompCredentials::new(
                env.secret("TRADE_FEED_STOMP_LOGIN"),
                env.secret("TRADE_FEED_STOMP_PASSCODE"),
            ),
            reconnect_delay: env.millis(
                "TRADE_FEED_RECONNECT_DELAY_MS",
                stream_defaults.reconnect_delay,
            )?,
            heartbeat_outgoing: env.millis(
                "TRADE_FEED_HEARTBEAT_OUTGOING_MS",
                stream_defaults.heartbeat_outgoing,
            )?,
            heartbeat_incoming: env.millis(
                "TRADE_FEED_HEARTBEAT_INCOMING_MS",
                stream_defaults.heartbeat_incoming,
            )?,
            max_reconnect_attempts: env.number(
                "TRADE_FEED_MAX_RECONNECT_ATTEMPTS",
                stream_defaults.max_reconnect_attempts,
            )?,
            handshake_timeout: env.secs(
                "TRADE_FEED_HANDSHAKE_TIMEOUT_SECS",
                stream_defaults.handshake_timeout,
            )?,
        };
        if stream.max_reconnect_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRADE_FEED_MAX_RECONNECT_ATTEMPTS".to_string(),
                value: "0".to_string(),
            });
        }

        let api = ApiSettings {
            base_url: env
                .string("TRADE_FEED_API_BASE_URL")?
                .unwrap_or(api_defaults.base_url),
            token: env.secret("TRADE_FEED_API_TOKEN"),
            timeout: env.secs("TRADE_FEED_HTTP_TIMEOUT_SECS", api_defaults.timeout)?,
        };

        let feed_capacity = env.number("TRADE_FEED_FEED_CAPACITY", FEED_CAPACITY)?;
        if feed_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRADE_FEED_FEED_CAPACITY".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            user_id,
            stream,
            api,
            feed_capacity,
            status_port: env.number("TRADE_FEED_STATUS_PORT", 8083)?,
        })
    }

    /// Settings for the connection manager.
    #[must_use]
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.stream.url.clone());
        config.host.clone_from(&self.stream.host);
        config.login = self.stream.credentials.login().map(str::to_string);
        config.passcode = self.stream.credentials.passcode().map(str::to_string);
        config.heartbeat =
            HeartbeatConfig::new(self.stream.heartbeat_outgoing, self.stream.heartbeat_incoming);
        config.retry = RetryConfig::fixed(self.stream.reconnect_delay);
        config.max_attempts = self.stream.max_reconnect_attempts;
        config.handshake_timeout = self.stream.handshake_timeout;
        config
    }

    /// Settings for the REST client.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.api.base_url.clone(),
            token: self.api.token.clone(),
            timeout: self.api.timeout,
        }
    }
}

/// Configuration error.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-empty, or `None`. Empty values are errors.
    fn string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match (self.0)(key) {
            None => Ok(None),
            Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(value) => Ok(Some(value.trim().to_string())),
        }
    }

    /// Secrets may be left empty in `.env` files to mean "unset".
    fn secret(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required<T: FromStr>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self
            .string(key)?
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        parse(key, &value)
    }

    fn number<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.string(key)? {
            Some(value) => parse(key, &value),
            None => Ok(default),
        }
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .string(key)?
            .map(|value| parse::<u64>(key, &value))
            .transpose()?
            .map_or(default, Duration::from_millis))
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .string(key)?
            .map(|value| parse::<u64>(key, &value))
            .transpose()?
            .map_or(default, Duration::from_secs))
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
