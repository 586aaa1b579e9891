//! Configuration for the API client.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding the backend base URL.
pub const API_URL_ENV: &str = "DRISHTI_API_URL";
/// Environment variable overriding the identity store location.
pub const STORAGE_PATH_ENV: &str = "DRISHTI_STORAGE_PATH";
/// Environment variable overriding the stream idle timeout (seconds).
pub const STREAM_IDLE_TIMEOUT_ENV: &str = "DRISHTI_STREAM_IDLE_TIMEOUT_SECS";

/// Default backend location.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Configuration for [`ApiClient`](super::ApiClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL.
    pub base_url: String,
    /// Timeout for non-streaming requests.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Maximum silence between two reads of a chat stream.
    #[serde(with = "duration_serde")]
    pub stream_idle_timeout: Duration,
    /// User agent header value.
    pub user_agent: String,
    /// `SQLite` file holding the persisted identity.
    pub storage_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            stream_idle_timeout: Duration::from_secs(120),
            user_agent: format!("drishti-client/{}", env!("CARGO_PKG_VERSION")),
            storage_path: PathBuf::from("drishti.sqlite3"),
        }
    }
}

impl ClientConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `DRISHTI_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(API_URL_ENV) {
            config.base_url = url;
        }
        if let Ok(path) = std::env::var(STORAGE_PATH_ENV) {
            config.storage_path = PathBuf::from(path);
        }
        if let Ok(raw) = std::env::var(STREAM_IDLE_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.stream_idle_timeout = Duration::from_secs(secs),
                _ => tracing::warn!("ignoring invalid {STREAM_IDLE_TIMEOUT_ENV}={raw}"),
            }
        }

        config
    }

    /// Set the backend base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the stream idle timeout.
    #[must_use]
    pub const fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    /// Set the identity store location.
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.stream_idle_timeout, Duration::from_secs(120));
        assert!(config.user_agent.starts_with("drishti-client/"));
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new()
            .with_base_url("http://api.example.test")
            .with_timeout(Duration::from_secs(5))
            .with_stream_idle_timeout(Duration::from_secs(9))
            .with_storage_path("/tmp/id.sqlite3");

        assert_eq!(config.base_url, "http://api.example.test");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.stream_idle_timeout, Duration::from_secs(9));
        assert_eq!(config.storage_path, PathBuf::from("/tmp/id.sqlite3"));
    }

    #[test]
    fn test_config_serializes_durations_as_seconds() {
        let json = serde_json::to_value(ClientConfig::default()).unwrap();
        assert_eq!(json["request_timeout"], 30);

        let restored: ClientConfig = serde_json::from_value(json).unwrap();
        assert_eq!(restored, ClientConfig::default());
    }
}
