//! Service configuration with validation.
//!
//! Every section is `#[serde(default)]` so partial config files work. The
//! session secret has no usable default and must be supplied through the
//! config file or `RPC_BRIDGE_SESSION_SECRET`.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable carrying the shared session secret
pub const ENV_SESSION_SECRET: &str = "RPC_BRIDGE_SESSION_SECRET";
/// Environment variable overriding the HTTP port
pub const ENV_HTTP_PORT: &str = "RPC_BRIDGE_HTTP_PORT";
/// Environment variable overriding the HTTP bind address
pub const ENV_HTTP_HOST: &str = "RPC_BRIDGE_HTTP_HOST";
/// Environment variable overriding the CORS allowed origin
pub const ENV_ALLOW_ORIGIN: &str = "RPC_BRIDGE_ALLOW_ORIGIN";

/// 30 days, in seconds
pub const DEFAULT_SESSION_LONGEVITY_SECS: u64 = 30 * 24 * 60 * 60;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Signed session configuration
    pub session: SessionConfig,
    /// Request limits
    pub limits: LimitsConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Streaming body configuration
    pub stream: StreamConfig,
    /// Background task configuration
    pub task: TaskConfig,
}

impl ServiceConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.secret.is_empty() {
            return Err(ConfigError::MissingSessionSecret);
        }

        if self.session.longevity_secs == 0 {
            return Err(ConfigError::InvalidLimit(
                "session longevity cannot be 0".into(),
            ));
        }

        if self.limits.max_body_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_body_size cannot be 0".into(),
            ));
        }

        if let Some(timeout) = self.stream.idle_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidTimeout(
                    "stream idle timeout cannot be 0".into(),
                ));
            }
        }

        if self.task.initial_backoff_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "initial task backoff cannot be 0".into(),
            ));
        }

        if self.task.initial_backoff_ms > self.task.max_backoff_ms {
            return Err(ConfigError::InvalidTimeout(
                "initial task backoff exceeds the maximum".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Load defaults and apply environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply environment overrides on top of the current values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup(ENV_SESSION_SECRET) {
            if secret.is_empty() {
                warn!("{} is set but empty", ENV_SESSION_SECRET);
            } else {
                self.session.secret = secret;
                info!("Loaded session secret from environment");
            }
        }

        if let Some(port) = lookup(ENV_HTTP_PORT) {
            match port.parse() {
                Ok(p) => self.http.port = p,
                Err(_) => warn!(value = %port, "{} is not a valid port", ENV_HTTP_PORT),
            }
        }

        if let Some(host) = lookup(ENV_HTTP_HOST) {
            match host.parse() {
                Ok(h) => self.http.host = h,
                Err(_) => warn!(value = %host, "{} is not a valid address", ENV_HTTP_HOST),
            }
        }

        if let Some(origin) = lookup(ENV_ALLOW_ORIGIN) {
            self.cors.allow_origin = origin;
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (0 picks an ephemeral port)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
        }
    }
}

/// Signed session configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Shared HMAC secret
    pub secret: String,
    /// Maximum token age in seconds
    pub longevity_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            longevity_secs: DEFAULT_SESSION_LONGEVITY_SECS,
        }
    }
}

// Keeps the secret out of logs.
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("longevity_secs", &self.longevity_secs)
            .finish()
    }
}

/// Request limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max buffered request body size in bytes (default: 1MB)
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origin ("*" for all)
    pub allow_origin: String,
    /// Max age for preflight cache, in seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            max_age: None,
        }
    }
}

/// Streaming body configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Abort a streaming body when no chunk arrives within this window
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
}

/// Background task configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Delay before the first retry, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound on the retry delay, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1000,
            max_backoff_ms: 60_000,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// No session secret configured
    #[error("session secret is empty; set {} or provide it in config", ENV_SESSION_SECRET)]
    MissingSessionSecret,
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Humantime serde module for optional Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&format!("{}ms", d.as_millis())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with_secret() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.session.secret = "some secrets".to_string();
        config
    }

    #[test]
    fn test_default_config_requires_secret() {
        let config = ServiceConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSessionSecret)
        ));
        assert!(with_secret().validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.limits.max_body_size, 1024 * 1024);
        assert_eq!(config.session.longevity_secs, 2_592_000);
        assert_eq!(config.cors.allow_origin, "*");
        assert!(config.stream.idle_timeout.is_none());
        assert_eq!(config.task.initial_backoff_ms, 1000);
        assert_eq!(config.task.max_backoff_ms, 60_000);
    }

    #[test]
    fn test_task_backoff_bounds_rejected() {
        let mut config = with_secret();
        config.task.initial_backoff_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));

        config.task.initial_backoff_ms = 120_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_zero_body_limit_rejected() {
        let mut config = with_secret();
        config.limits.max_body_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_zero_idle_timeout_rejected() {
        let mut config = with_secret();
        config.stream.idle_timeout = Some(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_SESSION_SECRET, "from-env"),
            (ENV_HTTP_PORT, "9090"),
            (ENV_HTTP_HOST, "127.0.0.1"),
            (ENV_ALLOW_ORIGIN, "https://example.com"),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.session.secret, "from-env");
        assert_eq!(config.http.port, 9090);
        assert_eq!(config.http_addr().to_string(), "127.0.0.1:9090");
        assert_eq!(config.cors.allow_origin, "https://example.com");
    }

    #[test]
    fn test_invalid_env_port_ignored() {
        let mut config = ServiceConfig::default();
        config.apply_overrides(|key| (key == ENV_HTTP_PORT).then(|| "not-a-port".to_string()));
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ServiceConfig = serde_json::from_value(serde_json::json!({
            "session": { "secret": "abc" },
            "stream": { "idle_timeout": "250ms" }
        }))
        .unwrap();

        assert_eq!(config.session.secret, "abc");
        assert_eq!(config.session.longevity_secs, DEFAULT_SESSION_LONGEVITY_SECS);
        assert_eq!(config.stream.idle_timeout, Some(Duration::from_millis(250)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_duration_units() {
        use super::humantime_serde::parse_duration;
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Ok(Duration::from_secs(10)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let text = format!("{:?}", with_secret());
        assert!(!text.contains("some secrets"));
        assert!(text.contains("<redacted>"));
    }
}
