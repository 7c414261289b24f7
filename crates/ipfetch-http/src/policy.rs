use crate::ResponseDirectives;
use http::{Method, StatusCode};
use std::time::{Duration, SystemTime};

/// Store-time expiry rules
///
/// The expiry computed here is written into the record and never recomputed.
#[derive(Debug, Clone, Default)]
pub struct ExpiryPolicy {
    /// Lifetime used when the server gives no explicit directive
    pub default_ttl: Option<Duration>,
    /// Always use `default_ttl`, ignoring `Cache-Control`/`Expires`
    pub ignore_server_directives: bool,
}

impl ExpiryPolicy {
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            default_ttl,
            ignore_server_directives: false,
        }
    }

    pub fn ignore_server_directives(mut self, ignore: bool) -> Self {
        self.ignore_server_directives = ignore;
        self
    }

    /// Calculate effective lifetime based on policy and response directives
    ///
    /// Priority: max-age > Expires > default TTL. `None` means the response
    /// must not be stored.
    pub fn effective_ttl(&self, directives: &ResponseDirectives, now: SystemTime) -> Option<Duration> {
        if self.ignore_server_directives {
            return self.default_ttl;
        }
        directives.explicit_lifetime(now).or(self.default_ttl)
    }

    /// Absolute expiry for a response stored at `now`
    pub fn expires_at(&self, directives: &ResponseDirectives, now: SystemTime) -> Option<SystemTime> {
        self.effective_ttl(directives, now)
            .map(|ttl| now.checked_add(ttl).unwrap_or(now))
    }
}

/// Whether any response to `method` could ever be stored
pub fn method_is_cacheable(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::POST)
}

/// Determine if a response may be written to the store at all
pub fn is_cacheable(method: &Method, status: StatusCode, directives: &ResponseDirectives) -> bool {
    if status != StatusCode::OK {
        return false;
    }
    if !method_is_cacheable(method) {
        return false;
    }
    !directives.cache_control.no_store
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheControl;

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn max_age(secs: u64) -> ResponseDirectives {
        ResponseDirectives {
            cache_control: CacheControl {
                max_age: Some(Duration::from_secs(secs)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_directive_wins_over_default() {
        let policy = ExpiryPolicy::new(Some(Duration::from_secs(3600)));
        assert_eq!(
            policy.expires_at(&max_age(60), now()),
            Some(now() + Duration::from_secs(60))
        );
    }

    #[test]
    fn test_default_ttl_without_directives() {
        let policy = ExpiryPolicy::new(Some(Duration::from_secs(3600)));
        assert_eq!(
            policy.expires_at(&ResponseDirectives::default(), now()),
            Some(now() + Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_nothing_to_go_on_means_no_store() {
        let policy = ExpiryPolicy::new(None);
        assert_eq!(policy.expires_at(&ResponseDirectives::default(), now()), None);
    }

    #[test]
    fn test_ignore_server_directives() {
        let policy = ExpiryPolicy::new(Some(Duration::from_secs(5))).ignore_server_directives(true);
        assert_eq!(policy.effective_ttl(&max_age(600), now()), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let policy = ExpiryPolicy::new(Some(Duration::ZERO));
        assert_eq!(policy.expires_at(&ResponseDirectives::default(), now()), Some(now()));
    }

    #[test]
    fn test_cacheability() {
        let plain = ResponseDirectives::default();
        assert!(is_cacheable(&Method::GET, StatusCode::OK, &plain));
        assert!(is_cacheable(&Method::POST, StatusCode::OK, &plain));
        assert!(!is_cacheable(&Method::PUT, StatusCode::OK, &plain));
        assert!(!is_cacheable(&Method::GET, StatusCode::NOT_FOUND, &plain));
        assert!(!is_cacheable(&Method::GET, StatusCode::CREATED, &plain));
        assert!(method_is_cacheable(&Method::HEAD));
        assert!(!method_is_cacheable(&Method::DELETE));
        assert!(!method_is_cacheable(&Method::PATCH));

        let no_store = ResponseDirectives {
            cache_control: CacheControl::parse("no-store"),
            ..Default::default()
        };
        assert!(!is_cacheable(&Method::GET, StatusCode::OK, &no_store));
    }
}
