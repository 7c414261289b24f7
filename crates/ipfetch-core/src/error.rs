//! Error types for cache storage and fetch operations

use std::time::Duration;
use thiserror::Error;

/// Error raised by a cache store
///
/// Never surfaced to a `fetch` caller: the orchestrator logs it and falls back
/// to cache-miss behavior.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Backing storage could not be opened or reached
    #[error("connection error: {0}")]
    Connection(String),

    /// Backend operation failed
    #[error("backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded
    #[error("corrupt record {fingerprint}: {reason}")]
    Corrupt { fingerprint: String, reason: String },

    /// Invalidation pattern did not compile
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Compression failed
    #[error("compression error: {0}")]
    Compression(String),

    /// Decompression failed
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for cache store operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error returned by `fetch`
///
/// `Clone` so a single outcome can be published to every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Connection-level failure (DNS, refused, reset, body read)
    #[error("transport error: {0}")]
    Transport(String),

    /// Request exceeded its timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Server kept answering 429 until the retry budget ran out
    #[error("rate limit exceeded{}", retry_after_suffix(.retry_after))]
    RateLimitExceeded { retry_after: Option<Duration> },

    /// Malformed request parameters; never sent
    #[error("invalid request: {0}")]
    Validation(String),

    /// Resource not found (404)
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Authentication failed (401/403)
    #[error("authentication failed (HTTP {status})")]
    Authentication { status: u16 },

    /// Server-side error (5xx)
    #[error("server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// Any other non-success status
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// Response could not be read or decoded
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// In-flight transaction vanished without publishing a result
    #[error("internal error: {0}")]
    Internal(String),
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl FetchError {
    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::NotFound { .. } => Some(404),
            FetchError::RateLimitExceeded { .. } => Some(429),
            FetchError::Authentication { status }
            | FetchError::Server { status, .. }
            | FetchError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-supplied retry-after hint
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this is a connection-level failure or timeout
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Timeout(_))
    }

    /// Whether another attempt could succeed under the default status set
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_)
            | FetchError::Timeout(_)
            | FetchError::RateLimitExceeded { .. } => true,
            FetchError::Server { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::Backend("disk full".to_string());
        assert_eq!(err.to_string(), "backend error: disk full");

        let err = FetchError::RateLimitExceeded {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.to_string(), "rate limit exceeded (retry after 2s)");

        let err = FetchError::RateLimitExceeded { retry_after: None };
        assert_eq!(err.to_string(), "rate limit exceeded");

        let err = FetchError::Server {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "server error (HTTP 503): unavailable");
    }

    #[test]
    fn test_status_and_hint() {
        let err = FetchError::RateLimitExceeded {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));

        let err = FetchError::Timeout("30s".to_string());
        assert_eq!(err.status(), None);
        assert!(err.is_transport());
        assert!(!FetchError::Validation("bad".into()).is_transport());
    }

    #[test]
    fn test_is_retryable() {
        assert!(FetchError::Timeout("30s".into()).is_retryable());
        assert!(FetchError::RateLimitExceeded { retry_after: None }.is_retryable());
        assert!(FetchError::Server { status: 503, body: String::new() }.is_retryable());
        assert!(!FetchError::Server { status: 501, body: String::new() }.is_retryable());
        assert!(!FetchError::NotFound { url: "u".into() }.is_retryable());
        assert!(!FetchError::Authentication { status: 401 }.is_retryable());
    }

    #[test]
    fn test_error_clone() {
        let err = FetchError::NotFound {
            url: "https://example.com/x".to_string(),
        };
        assert_eq!(err.clone(), err);
    }
}
