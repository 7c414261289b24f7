//! Mapping of non-success statuses to typed errors

use http::StatusCode;
use http::header::RETRY_AFTER;
use ipfetch_core::FetchError;
use std::time::{Duration, SystemTime};

use crate::TransportResponse;
use crate::cache_control::parse_http_date;

/// Error bodies are cut to this many characters
pub const ERROR_BODY_LIMIT: usize = 500;

/// Parse a `Retry-After` value: delay-seconds or an HTTP-date
pub fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // Fractional seconds are not standard but some APIs send them
    if let Ok(secs) = value.parse::<f64>() {
        return (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs));
    }
    parse_http_date(value).map(|at| at.duration_since(now).unwrap_or_default())
}

/// Typed error for a non-success response, `None` for 2xx/3xx
pub fn error_for_status(response: &TransportResponse, now: SystemTime) -> Option<FetchError> {
    let status = response.status;
    if status.is_success() || status.is_redirection() {
        return None;
    }

    let body: String = String::from_utf8_lossy(&response.body)
        .chars()
        .take(ERROR_BODY_LIMIT)
        .collect();

    Some(match status {
        StatusCode::NOT_FOUND => FetchError::NotFound {
            url: response.url.clone(),
        },
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimitExceeded {
            retry_after: response
                .headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, now)),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Authentication {
            status: status.as_u16(),
        },
        s if s.is_server_error() => FetchError::Server {
            status: s.as_u16(),
            body,
        },
        s => FetchError::Api {
            status: s.as_u16(),
            body,
        },
    })
}
