//! Server cache directives

use chrono::DateTime;
use http::HeaderMap;
use http::header::{CACHE_CONTROL, DATE, EXPIRES};
use std::time::{Duration, SystemTime};

/// Parsed Cache-Control header directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// Max age in seconds
    pub max_age: Option<Duration>,
    /// No-cache directive
    pub no_cache: bool,
    /// No-store directive
    pub no_store: bool,
}

impl CacheControl {
    /// Parse from header string value
    ///
    /// Unknown directives are ignored; a malformed `max-age` is dropped.
    pub fn parse(header: &str) -> Self {
        let mut cc = Self::default();
        for directive in header.split(',') {
            let directive = directive.trim();
            let (name, value) = match directive.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
                None => (directive, None),
            };

            if name.eq_ignore_ascii_case("no-cache") {
                cc.no_cache = true;
            } else if name.eq_ignore_ascii_case("no-store") {
                cc.no_store = true;
            } else if name.eq_ignore_ascii_case("max-age") {
                if let Some(secs) = value.and_then(|v| v.parse::<u64>().ok()) {
                    cc.max_age = Some(Duration::from_secs(secs));
                }
            }
        }
        cc
    }

    /// Merge every `Cache-Control` header in the map
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let joined = headers
            .get_all(CACHE_CONTROL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");
        Self::parse(&joined)
    }
}

/// Everything a response says about its own lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseDirectives {
    pub cache_control: CacheControl,
    /// `Expires`; `Some(UNIX_EPOCH)` when present but unparsable (already expired)
    pub expires: Option<SystemTime>,
    /// `Date`
    pub date: Option<SystemTime>,
}

impl ResponseDirectives {
    /// Extract directives from response headers
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header_str = |name| headers.get(name).and_then(|v| v.to_str().ok());
        Self {
            cache_control: CacheControl::from_headers(headers),
            expires: header_str(EXPIRES)
                .map(|v| parse_http_date(v).unwrap_or(SystemTime::UNIX_EPOCH)),
            date: header_str(DATE).and_then(parse_http_date),
        }
    }

    /// Explicit freshness lifetime granted by the server, if any
    ///
    /// `max-age` wins over `Expires`; `Expires` is measured against `Date`
    /// (or `now` when the server sent none) so clock skew cancels out.
    pub fn explicit_lifetime(&self, now: SystemTime) -> Option<Duration> {
        if self.cache_control.no_cache {
            return Some(Duration::ZERO);
        }
        if let Some(max_age) = self.cache_control.max_age {
            return Some(max_age);
        }
        let expires = self.expires?;
        let base = self.date.unwrap_or(now);
        Some(expires.duration_since(base).unwrap_or_default())
    }
}

/// Parse an HTTP-date (RFC 7231 IMF-fixdate, which is RFC 2822 compatible)
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let parsed = DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let secs = u64::try_from(parsed.timestamp()).ok()?;
    Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(*v));
        }
        map
    }

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn test_parse_directives() {
        let cc = CacheControl::parse("public, max-age=3600, no-cache");
        assert_eq!(cc.max_age, Some(Duration::from_secs(3600)));
        assert!(cc.no_cache);
        assert!(!cc.no_store);

        let cc = CacheControl::parse("No-Store");
        assert!(cc.no_store);

        let cc = CacheControl::parse("max-age=\"60\"");
        assert_eq!(cc.max_age, Some(Duration::from_secs(60)));

        let cc = CacheControl::parse("max-age=soon");
        assert_eq!(cc.max_age, None);
    }

    #[test]
    fn test_multiple_cache_control_headers() {
        let map = headers(&[("cache-control", "max-age=10"), ("cache-control", "no-store")]);
        let cc = CacheControl::from_headers(&map);
        assert_eq!(cc.max_age, Some(Duration::from_secs(10)));
        assert!(cc.no_store);
    }

    #[test]
    fn test_parse_http_date() {
        let t = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(t, SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480));
        assert!(parse_http_date("yesterday").is_none());
    }

    #[test]
    fn test_max_age_beats_expires() {
        let map = headers(&[
            ("cache-control", "max-age=30"),
            ("date", "Wed, 21 Oct 2015 07:28:00 GMT"),
            ("expires", "Wed, 21 Oct 2015 08:28:00 GMT"),
        ]);
        let d = ResponseDirectives::from_headers(&map);
        assert_eq!(d.explicit_lifetime(now()), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_expires_relative_to_date() {
        let map = headers(&[
            ("date", "Wed, 21 Oct 2015 07:28:00 GMT"),
            ("expires", "Wed, 21 Oct 2015 08:28:00 GMT"),
        ]);
        let d = ResponseDirectives::from_headers(&map);
        assert_eq!(d.explicit_lifetime(now()), Some(Duration::from_secs(3600)));

        let map = headers(&[
            ("date", "Wed, 21 Oct 2015 07:28:00 GMT"),
            ("expires", "Wed, 21 Oct 2015 06:28:00 GMT"),
        ]);
        let d = ResponseDirectives::from_headers(&map);
        assert_eq!(d.explicit_lifetime(now()), Some(Duration::ZERO));
    }

    #[test]
    fn test_invalid_expires_means_expired() {
        let map = headers(&[("expires", "0")]);
        let d = ResponseDirectives::from_headers(&map);
        assert_eq!(d.expires, Some(SystemTime::UNIX_EPOCH));
        assert_eq!(d.explicit_lifetime(now()), Some(Duration::ZERO));
    }

    #[test]
    fn test_no_directives() {
        let d = ResponseDirectives::from_headers(&HeaderMap::new());
        assert_eq!(d.explicit_lifetime(now()), None);
    }

    #[test]
    fn test_no_cache_is_zero_lifetime() {
        let map = headers(&[("cache-control", "no-cache, max-age=600")]);
        let d = ResponseDirectives::from_headers(&map);
        assert_eq!(d.explicit_lifetime(now()), Some(Duration::ZERO));
    }
}
