use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use ipfetch_core::{CacheRecord, FetchError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// How a response was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Served from a fresh stored record
    Hit,
    /// Fetched from the origin (possibly by another caller's coalesced fetch)
    Miss,
    /// Stored body confirmed current by a `304`
    Revalidated,
    /// The store was not consulted: cache disabled or a method that is never cached
    Bypass,
}

/// Raw response as produced by a transport
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Final URL after redirects
    pub url: String,
}

impl TransportResponse {
    /// Header list in the shape stored in cache records
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        header_pairs(&self.headers)
    }
}

/// Response handed to connectors
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: String,
    pub cache_status: CacheStatus,
}

impl Response {
    /// Wrap a transport response
    pub fn from_transport(raw: TransportResponse, cache_status: CacheStatus) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            url: raw.url,
            cache_status,
        }
    }

    /// Rebuild a response from a stored record
    pub fn from_record(record: &CacheRecord, cache_status: CacheStatus) -> Self {
        Self {
            status: StatusCode::from_u16(record.status).unwrap_or(StatusCode::OK),
            headers: header_map(&record.headers),
            body: record.body.clone(),
            url: record.url.clone(),
            cache_status,
        }
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| FetchError::MalformedResponse(format!("invalid JSON from {}: {e}", self.url)))
    }

    /// Whether this response was served without contacting the origin
    pub fn is_cache_hit(&self) -> bool {
        self.cache_status == CacheStatus::Hit
    }

    /// First value of a header as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Flatten a header map, keeping only text values
pub fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

/// Convert stored header pairs to a HeaderMap, skipping invalid entries
pub fn header_map(pairs: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (k, v) in pairs {
        if let (Ok(name), Ok(val)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
            map.append(name, val);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipfetch_core::Fingerprint;
    use std::time::SystemTime;

    #[test]
    fn test_from_record() {
        let now = SystemTime::UNIX_EPOCH;
        let record = CacheRecord::new(
            Fingerprint::from_hex("ab"),
            "GET",
            "https://example.com/doc",
            200,
            vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("set-cookie".to_string(), "a=1".to_string()),
                ("set-cookie".to_string(), "b=2".to_string()),
            ],
            Bytes::from_static(br#"{"id":7}"#),
            now,
            now,
        );
        let resp = Response::from_record(&record, CacheStatus::Hit);
        assert!(resp.is_cache_hit());
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.headers.get_all("set-cookie").iter().count(), 2);

        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_json_error_is_malformed_response() {
        let resp = Response {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"<html>"),
            url: "https://example.com/".to_string(),
            cache_status: CacheStatus::Miss,
        };
        let err = resp.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
        assert_eq!(resp.text(), "<html>");
        assert!(!resp.is_cache_hit());
    }

    #[test]
    fn test_header_pairs_roundtrip() {
        let mut map = HeaderMap::new();
        map.insert("etag", HeaderValue::from_static("\"x\""));
        let pairs = header_pairs(&map);
        assert_eq!(pairs, vec![("etag".to_string(), "\"x\"".to_string())]);
        assert_eq!(header_map(&pairs), map);
    }
}
