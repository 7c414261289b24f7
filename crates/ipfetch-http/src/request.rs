//! Outbound request model and validation

use bytes::Bytes;
use http::header::{CONTENT_TYPE, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use ipfetch_core::FetchError;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// A logical request as issued by a connector
///
/// Nothing is validated until [`Request::prepare`]; a malformed request
/// fails there without ever reaching the transport.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    body_error: Option<String>,
    timeout: Option<Duration>,
}

impl Request {
    /// Create a request; `url` may be absolute or relative to the client's base URL
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            body_error: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Set a header, overriding any client default of the same name
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `value` as the JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.body = Some(Bytes::from(body));
                if !self.has_header(CONTENT_TYPE.as_str()) {
                    self.headers
                        .push((CONTENT_TYPE.to_string(), "application/json".to_string()));
                }
            }
            Err(e) => self.body_error = Some(format!("json body: {e}")),
        }
        self
    }

    /// Set a raw body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Per-request timeout, overriding the client default
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Resolve the URL and headers into a sendable request
    ///
    /// `defaults` are applied first; request headers replace them by name.
    pub fn prepare(&self, base_url: Option<&str>, defaults: &HeaderMap) -> Result<PreparedRequest, FetchError> {
        if let Some(reason) = &self.body_error {
            return Err(FetchError::Validation(reason.clone()));
        }

        let mut url = resolve_url(&self.url, base_url)?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }

        let mut headers = defaults.clone();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::Validation(format!("invalid header name: {name:?}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FetchError::Validation(format!("invalid value for header {name}")))?;
            headers.insert(name, value);
        }

        Ok(PreparedRequest {
            method: self.method.clone(),
            url,
            headers,
            body: self.body.clone(),
            timeout: self.timeout,
        })
    }
}

fn resolve_url(raw: &str, base_url: Option<&str>) -> Result<Url, FetchError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FetchError::Validation("empty URL".to_string()));
    }

    let joined;
    let absolute = if has_scheme(raw) {
        raw
    } else {
        let base = base_url.ok_or_else(|| {
            FetchError::Validation(format!("relative URL {raw:?} with no base URL configured"))
        })?;
        joined = if raw.starts_with('/') {
            format!("{base}{raw}")
        } else {
            format!("{base}/{raw}")
        };
        joined.as_str()
    };

    let url = Url::parse(absolute)
        .map_err(|e| FetchError::Validation(format!("invalid URL {absolute:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::Validation(format!("unsupported scheme: {}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(FetchError::Validation(format!("URL has no host: {absolute}")));
    }
    Ok(url)
}

/// Whether `raw` starts with `scheme://`, ignoring any `://` inside a path or query
fn has_scheme(raw: &str) -> bool {
    let Some(end) = raw.find("://") else {
        return false;
    };
    let scheme = &raw[..end];
    scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// A validated request ready for the transport
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl PreparedRequest {
    /// Copy of this request carrying revalidation headers
    pub fn conditional(&self, etag: Option<&str>, last_modified: Option<&str>) -> Self {
        let mut req = self.clone();
        if let Some(value) = etag.and_then(|v| HeaderValue::from_str(v).ok()) {
            req.headers.insert(IF_NONE_MATCH, value);
        }
        if let Some(value) = last_modified.and_then(|v| HeaderValue::from_str(v).ok()) {
            req.headers.insert(IF_MODIFIED_SINCE, value);
        }
        req
    }

    /// Whether this request carries revalidation headers
    pub fn is_conditional(&self) -> bool {
        self.headers.contains_key(IF_NONE_MATCH) || self.headers.contains_key(IF_MODIFIED_SINCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("user-agent", HeaderValue::from_static("test-agent"));
        map.insert("accept-language", HeaderValue::from_static("en-US,en;q=0.9"));
        map
    }

    #[test]
    fn test_relative_url_joins_base() {
        let req = Request::get("/patents/US123").query("format", "json");
        let prepared = req.prepare(Some("https://api.example.com/v1"), &defaults()).unwrap();
        assert_eq!(prepared.url.as_str(), "https://api.example.com/v1/patents/US123?format=json");

        let prepared = Request::get("search")
            .prepare(Some("https://api.example.com"), &defaults())
            .unwrap();
        assert_eq!(prepared.url.as_str(), "https://api.example.com/search");
    }

    #[test]
    fn test_url_inside_query_stays_relative() {
        let prepared = Request::get("/resolve?target=https://doi.org/10.1000/x")
            .prepare(Some("https://api.example.com/v1"), &defaults())
            .unwrap();
        assert_eq!(prepared.url.host_str(), Some("api.example.com"));
        assert_eq!(prepared.url.path(), "/v1/resolve");
        assert_eq!(
            prepared.url.query_pairs().next().map(|(_, v)| v.into_owned()),
            Some("https://doi.org/10.1000/x".to_string())
        );

        let prepared = Request::get("lookup/https://example.org")
            .prepare(Some("https://api.example.com"), &defaults())
            .unwrap();
        assert_eq!(prepared.url.host_str(), Some("api.example.com"));
    }

    #[test]
    fn test_absolute_url_ignores_base() {
        let prepared = Request::get("https://other.example.org/x")
            .prepare(Some("https://api.example.com"), &defaults())
            .unwrap();
        assert_eq!(prepared.url.host_str(), Some("other.example.org"));
    }

    #[test]
    fn test_header_overrides_default() {
        let prepared = Request::get("https://example.com/")
            .header("User-Agent", "custom")
            .prepare(None, &defaults())
            .unwrap();
        assert_eq!(prepared.headers["user-agent"], "custom");
        assert_eq!(prepared.headers["accept-language"], "en-US,en;q=0.9");
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let prepared = Request::post("https://example.com/search")
            .json(&serde_json::json!({"q": "widget"}))
            .prepare(None, &HeaderMap::new())
            .unwrap();
        assert_eq!(prepared.headers[CONTENT_TYPE], "application/json");
        assert_eq!(prepared.body.unwrap(), Bytes::from_static(br#"{"q":"widget"}"#));
    }

    #[test]
    fn test_validation_failures() {
        let none = HeaderMap::new();
        let cases = [
            Request::get("/relative"),
            Request::get("ftp://example.com/file"),
            Request::get("http://"),
            Request::get("   "),
            Request::get("https://example.com/").header("bad header", "x"),
            Request::get("https://example.com/").header("x-ok", "line\nbreak"),
        ];
        for req in cases {
            match req.prepare(None, &none) {
                Err(FetchError::Validation(_)) => {}
                other => panic!("expected validation error for {:?}, got {other:?}", req.url()),
            }
        }
    }

    #[test]
    fn test_conditional_headers() {
        let prepared = Request::get("https://example.com/doc")
            .prepare(None, &HeaderMap::new())
            .unwrap();
        assert!(!prepared.is_conditional());

        let cond = prepared.conditional(Some("\"v1\""), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert!(cond.is_conditional());
        assert_eq!(cond.headers[IF_NONE_MATCH], "\"v1\"");
        assert_eq!(cond.headers[IF_MODIFIED_SINCE], "Wed, 21 Oct 2015 07:28:00 GMT");
    }
}
