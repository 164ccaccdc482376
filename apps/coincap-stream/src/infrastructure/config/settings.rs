//! Client Configuration Settings
//!
//! Configuration types for the CoinCap client, loaded from environment
//! variables with defaults for everything.

use std::time::Duration;

use crate::infrastructure::coincap::backoff::RetryConfig;

/// Default streaming host.
pub const DEFAULT_STREAM_ENDPOINT: &str = "coincap.io";

/// Default REST base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://coincap.io/";

/// Socket.IO WebSocket settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Host name of the streaming endpoint.
    pub endpoint: String,
    /// Use `wss` instead of `ws`.
    pub use_secure_transport: bool,
    /// Port override. Defaults to 443 for `wss` and 80 for `ws`.
    pub port: Option<u16>,
    /// Limit on dialing plus the open handshake.
    pub handshake_timeout: Duration,
    /// Limit on tearing a session down.
    pub close_timeout: Duration,
    /// Ping interval override. `None` uses the server's value.
    pub heartbeat_interval: Option<Duration>,
    /// Pong timeout override. `None` uses the server's value.
    pub heartbeat_timeout: Option<Duration>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_STREAM_ENDPOINT.to_string(),
            use_secure_transport: true,
            port: None,
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
            heartbeat_interval: None,
            heartbeat_timeout: None,
        }
    }
}

impl StreamSettings {
    /// Effective port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.use_secure_transport { 443 } else { 80 })
    }

    /// Engine.IO v3 WebSocket URL for this endpoint.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_secure_transport { "wss" } else { "ws" };
        format!(
            "{scheme}://{}:{}/socket.io/?EIO=3&transport=websocket",
            self.endpoint,
            self.port()
        )
    }
}

/// REST API settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    /// Base URL, with trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry behavior for transient failures.
    pub retry: RetryConfig,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Streaming settings.
    pub stream: StreamSettings,
    /// REST settings.
    pub api: ApiSettings,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stream: StreamSettings::default(),
            api: ApiSettings::default(),
            metrics_port: 9090,
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a set variable is empty where a value is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let endpoint = match std::env::var("COINCAP_STREAM_ENDPOINT") {
            Ok(value) if value.trim().is_empty() => {
                return Err(ConfigError::EmptyValue(
                    "COINCAP_STREAM_ENDPOINT".to_string(),
                ));
            }
            Ok(value) => value,
            Err(_) => defaults.stream.endpoint.clone(),
        };

        let base_url = match std::env::var("COINCAP_API_BASE_URL") {
            Ok(value) if value.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("COINCAP_API_BASE_URL".to_string()));
            }
            Ok(value) => normalize_base_url(value),
            Err(_) => defaults.api.base_url.clone(),
        };

        let stream = StreamSettings {
            endpoint,
            use_secure_transport: parse_env_bool(
                "COINCAP_STREAM_SECURE",
                defaults.stream.use_secure_transport,
            ),
            port: parse_env_opt_u16("COINCAP_STREAM_PORT"),
            handshake_timeout: defaults.stream.handshake_timeout,
            close_timeout: defaults.stream.close_timeout,
            heartbeat_interval: parse_env_opt_duration_secs("COINCAP_HEARTBEAT_INTERVAL_SECS"),
            heartbeat_timeout: parse_env_opt_duration_secs("COINCAP_HEARTBEAT_TIMEOUT_SECS"),
        };

        let api = ApiSettings {
            base_url,
            timeout: parse_env_duration_secs("COINCAP_HTTP_TIMEOUT_SECS", defaults.api.timeout),
            retry: RetryConfig {
                initial_delay: parse_env_duration_millis(
                    "COINCAP_HTTP_RETRY_DELAY_INITIAL_MS",
                    defaults.api.retry.initial_delay,
                ),
                max_delay: parse_env_duration_secs(
                    "COINCAP_HTTP_RETRY_DELAY_MAX_SECS",
                    defaults.api.retry.max_delay,
                ),
                max_retries: parse_env_u32(
                    "COINCAP_HTTP_MAX_RETRIES",
                    defaults.api.retry.max_retries,
                ),
                ..defaults.api.retry
            },
        };

        Ok(Self {
            stream,
            api,
            metrics_port: parse_env_u16("COINCAP_METRICS_PORT", defaults.metrics_port),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn normalize_base_url(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_opt_u16(key: &str) -> Option<u16> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|port| *port != 0)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_opt_duration_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs != 0)
        .map(Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
