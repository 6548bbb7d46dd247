//! Live signaling configuration.
//!
//! Configuration is loaded from environment variables. The Redis URL may
//! carry a password and is redacted in Debug output.

use crate::peer::{PeerConfig, DEFAULT_STUN_URLS};
use common::config::ObservabilityConfig;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default stream API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Default room token exchange path, relative to the API URL.
pub const DEFAULT_ROOM_TOKEN_PATH: &str = "/rooms/token";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Default maximum audio bitrate for managed rooms (bits per second).
pub const DEFAULT_MAX_AUDIO_BITRATE: u32 = 16_000;

/// Which live backend sessions are created on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Peer-to-peer WebRTC negotiated through the signaling store.
    #[default]
    Custom,
    /// Rooms hosted by the managed conferencing service.
    Managed,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Custom => "custom",
            BackendKind::Managed => "managed",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "custom" | "webrtc" => Ok(BackendKind::Custom),
            "managed" | "twilio" => Ok(BackendKind::Managed),
            other => Err(ConfigError::InvalidValue(format!(
                "LIVE_BACKEND must be 'custom' or 'managed', got '{other}'"
            ))),
        }
    }
}

/// Live signaling configuration.
#[derive(Clone)]
pub struct Config {
    pub backend: BackendKind,

    /// Signaling store URL. Needed by the custom backend when backed by
    /// Redis, and by the janitor.
    pub redis_url: Option<SecretString>,

    pub stun_urls: Vec<String>,

    /// Base URL of the stream API and the room token exchange.
    pub api_url: String,

    pub room_token_path: String,

    pub http_timeout: Duration,

    /// How long a broadcaster waits for an answer. `None` waits until the
    /// session ends.
    pub answer_timeout: Option<Duration>,

    pub max_audio_bitrate: u32,

    pub observability: ObservabilityConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("backend", &self.backend)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("stun_urls", &self.stun_urls)
            .field("api_url", &self.api_url)
            .field("room_token_path", &self.room_token_path)
            .field("http_timeout", &self.http_timeout)
            .field("answer_timeout", &self.answer_timeout)
            .field("max_audio_bitrate", &self.max_audio_bitrate)
            .field("observability", &self.observability)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            redis_url: None,
            stun_urls: DEFAULT_STUN_URLS.iter().map(ToString::to_string).collect(),
            api_url: DEFAULT_API_URL.to_string(),
            room_token_path: DEFAULT_ROOM_TOKEN_PATH.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
            answer_timeout: None,
            max_audio_bitrate: DEFAULT_MAX_AUDIO_BITRATE,
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn parse_number<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    vars.get(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| {
                ConfigError::InvalidValue(format!("{name} must be a non-negative integer, got '{raw}'"))
            })
        })
        .transpose()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparseable values.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend = match vars.get("LIVE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.backend,
        };

        let redis_url = vars
            .get("REDIS_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|url| SecretString::from(url.clone()));

        let stun_urls = match vars.get("LIVE_STUN_URLS") {
            Some(raw) => {
                let urls: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(ToString::to_string)
                    .collect();
                if urls.is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "LIVE_STUN_URLS must list at least one URL".to_string(),
                    ));
                }
                urls
            }
            None => defaults.stun_urls,
        };

        let api_url = vars
            .get("LIVE_API_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);

        let room_token_path = vars
            .get("LIVE_ROOM_TOKEN_PATH")
            .cloned()
            .unwrap_or(defaults.room_token_path);

        let http_timeout = parse_number::<u64>(vars, "LIVE_HTTP_TIMEOUT_SECONDS")?
            .map_or(defaults.http_timeout, Duration::from_secs);

        let answer_timeout =
            parse_number::<u64>(vars, "LIVE_ANSWER_TIMEOUT_SECONDS")?.map(Duration::from_secs);

        let max_audio_bitrate = parse_number::<u32>(vars, "LIVE_MAX_AUDIO_BITRATE")?
            .unwrap_or(defaults.max_audio_bitrate);

        Ok(Config {
            backend,
            redis_url,
            stun_urls,
            api_url,
            room_token_path,
            http_timeout,
            answer_timeout,
            max_audio_bitrate,
            observability: ObservabilityConfig::from_vars(vars),
        })
    }

    /// The Redis URL, for callers that cannot run without one.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when `REDIS_URL` is unset.
    pub fn require_redis_url(&self) -> Result<&SecretString, ConfigError> {
        self.redis_url
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))
    }

    /// Peer connection settings built from the STUN list.
    #[must_use]
    pub fn peer_config(&self) -> PeerConfig {
        PeerConfig::with_stun_urls(self.stun_urls.clone())
    }

    /// Full URL of the room token exchange.
    #[must_use]
    pub fn room_token_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            self.room_token_path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("defaults should load");

        assert_eq!(config.backend, BackendKind::Custom);
        assert!(config.redis_url.is_none());
        assert_eq!(
            config.stun_urls,
            vec![
                "stun:stun1.l.google.com:19302".to_string(),
                "stun:stun2.l.google.com:19302".to_string()
            ]
        );
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.answer_timeout, None);
        assert_eq!(config.max_audio_bitrate, 16_000);
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_custom_values() {
        let config = Config::from_vars(&vars(&[
            ("LIVE_BACKEND", "managed"),
            ("REDIS_URL", "redis://:pw@cache:6379"),
            ("LIVE_STUN_URLS", "stun:a.example:3478, stun:b.example:3478"),
            ("LIVE_API_URL", "https://api.example.com/"),
            ("LIVE_ROOM_TOKEN_PATH", "/twilio/token"),
            ("LIVE_HTTP_TIMEOUT_SECONDS", "3"),
            ("LIVE_ANSWER_TIMEOUT_SECONDS", "30"),
            ("LIVE_MAX_AUDIO_BITRATE", "32000"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Managed);
        assert_eq!(
            config.redis_url.unwrap().expose_secret(),
            "redis://:pw@cache:6379"
        );
        assert_eq!(config.stun_urls.len(), 2);
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.http_timeout, Duration::from_secs(3));
        assert_eq!(config.answer_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_audio_bitrate, 32_000);
    }

    #[test]
    fn test_room_token_url_joins_cleanly() {
        let config = Config::from_vars(&vars(&[
            ("LIVE_API_URL", "https://api.example.com/"),
            ("LIVE_ROOM_TOKEN_PATH", "/twilio/token"),
        ]))
        .unwrap();
        assert_eq!(config.room_token_url(), "https://api.example.com/twilio/token");
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let result = Config::from_vars(&vars(&[("LIVE_BACKEND", "carrier-pigeon")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("LIVE_BACKEND")));
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let result = Config::from_vars(&vars(&[("LIVE_HTTP_TIMEOUT_SECONDS", "soon")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("LIVE_HTTP_TIMEOUT_SECONDS"))
        );
    }

    #[test]
    fn test_empty_stun_list_rejected() {
        let result = Config::from_vars(&vars(&[("LIVE_STUN_URLS", " , ")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_require_redis_url() {
        let config = Config::default();
        assert!(matches!(
            config.require_redis_url(),
            Err(ConfigError::MissingEnvVar(v)) if v == "REDIS_URL"
        ));
    }

    #[test]
    fn test_debug_redacts_redis_url() {
        let config = Config::from_vars(&vars(&[("REDIS_URL", "redis://:hunter2@cache:6379")])).unwrap();
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains("redis://"));
    }

    #[test]
    fn test_peer_config_carries_stun_urls() {
        let config = Config::from_vars(&vars(&[("LIVE_STUN_URLS", "stun:only.example:3478")])).unwrap();
        let peer = config.peer_config();
        assert_eq!(peer.ice_servers[0].urls, vec!["stun:only.example:3478".to_string()]);
    }
}
