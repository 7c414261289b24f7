//! Client configuration

use ipfetch_http::{DEFAULT_RETRY_STATUSES, DEFAULT_VARY_HEADERS, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Desktop-browser User-Agent sent unless overridden
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36";

/// Accept-Language sent unless overridden
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Rejected configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The HTTP transport could not be constructed
    #[error("transport setup failed: {0}")]
    Transport(String),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Total budget across attempts and delays
    pub max_elapsed_ms: u64,
    /// Upper bound of random delay added to each computed backoff
    pub jitter_ms: u64,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 20_000,
            max_elapsed_ms: 120_000,
            jitter_ms: 1_000,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::invalid(
                "retry.initial_backoff_ms",
                "must not exceed retry.max_backoff_ms",
            ));
        }
        if let Some(bad) = self.retry_statuses.iter().find(|s| !(100..=599).contains(*s)) {
            return Err(ConfigError::invalid(
                "retry.retry_statuses",
                format!("{bad} is not an HTTP status"),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
            .with_backoff(
                Duration::from_millis(self.initial_backoff_ms),
                Duration::from_millis(self.max_backoff_ms),
            )
            .with_max_elapsed(Duration::from_millis(self.max_elapsed_ms))
            .with_jitter(Duration::from_millis(self.jitter_ms))
            .with_statuses(self.retry_statuses.iter().copied())
    }
}

/// Configuration for a `Client`
///
/// Every field has a default, so a partial document deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Consult and populate the cache
    pub use_cache: bool,
    /// Lifetime for responses without explicit server directives; unset
    /// means such responses are not stored
    pub ttl_seconds: Option<u64>,
    /// Directory holding the cache database
    pub cache_dir: Option<PathBuf>,
    /// Database file stem inside `cache_dir`
    pub cache_name: String,
    /// Prefix for relative request URLs
    pub base_url: Option<String>,
    pub user_agent: String,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    /// Request headers that participate in the fingerprint
    pub vary_headers: Vec<String>,
    pub timeout_ms: u64,
    pub max_redirects: usize,
    /// Always use `ttl_seconds`, ignoring Cache-Control and Expires
    pub ignore_server_directives: bool,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            ttl_seconds: None,
            cache_dir: None,
            cache_name: "default".to_string(),
            base_url: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: BTreeMap::new(),
            vary_headers: DEFAULT_VARY_HEADERS.iter().map(|h| h.to_string()).collect(),
            timeout_ms: 30_000,
            max_redirects: 10,
            ignore_server_directives: false,
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Config for a connector with its own base URL and cache file
    pub fn for_source(cache_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Check field values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::invalid("cache_name", "must not be empty"));
        }
        if self.cache_name.contains(['/', '\\']) {
            return Err(ConfigError::invalid("cache_name", "must be a file stem, not a path"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout_ms", "must be positive"));
        }
        if let Some(base) = &self.base_url {
            let url = url::Url::parse(base)
                .map_err(|e| ConfigError::invalid("base_url", e.to_string()))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::invalid("base_url", "must be http or https"));
            }
        }
        self.retry.validate()
    }

    /// Base URL with any trailing `/` removed
    pub fn normalized_base_url(&self) -> Option<String> {
        self.base_url
            .as_deref()
            .map(|b| b.trim_end_matches('/').to_string())
    }

    /// Default lifetime as a duration
    pub fn default_ttl(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolved cache directory
    ///
    /// Falls back to the per-user cache directory, then `~/.cache`.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
            .unwrap_or_else(std::env::temp_dir)
            .join("ipfetch")
    }

    /// Full path of the cache database
    pub fn cache_path(&self) -> PathBuf {
        self.resolved_cache_dir().join(format!("{}.db", self.cache_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.use_cache);
        assert_eq!(config.ttl_seconds, None);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.vary_headers, vec!["accept", "accept-language"]);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.retry_statuses, vec![429, 500, 502, 503, 504]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"ttl_seconds": 3600, "retry": {"max_attempts": 2}}"#).unwrap();
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(3600)));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.max_backoff_ms, 20_000);
        assert_eq!(config.cache_name, "default");
    }

    #[test]
    fn test_cache_path() {
        let config = ClientConfig {
            cache_dir: Some(PathBuf::from("/tmp/ipfetch-test")),
            cache_name: "uspto".to_string(),
            ..Default::default()
        };
        assert_eq!(config.cache_path(), PathBuf::from("/tmp/ipfetch-test/uspto.db"));

        let default = ClientConfig::default();
        assert!(default.cache_path().ends_with("ipfetch/default.db"));
    }

    #[test]
    fn test_base_url_normalized() {
        let config = ClientConfig::for_source("epo", "https://ops.epo.org/3.2/");
        assert_eq!(config.normalized_base_url().as_deref(), Some("https://ops.epo.org/3.2"));
    }

    #[test]
    fn test_validation() {
        let bad = [
            ClientConfig {
                cache_name: String::new(),
                ..Default::default()
            },
            ClientConfig {
                cache_name: "../escape".to_string(),
                ..Default::default()
            },
            ClientConfig {
                timeout_ms: 0,
                ..Default::default()
            },
            ClientConfig {
                base_url: Some("ftp://example.com".to_string()),
                ..Default::default()
            },
            ClientConfig {
                retry: RetryConfig {
                    max_attempts: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
            ClientConfig {
                retry: RetryConfig {
                    retry_statuses: vec![429, 42],
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })), "{config:?}");
        }
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_backoff, Duration::from_secs(1));
        assert_eq!(policy.max_backoff, Duration::from_secs(20));
        assert!(policy.retry_statuses.contains(&429));
    }
}
