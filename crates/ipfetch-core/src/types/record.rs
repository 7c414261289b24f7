//! Cached response record

use bytes::Bytes;
use std::time::{Duration, SystemTime};

use super::fingerprint::Fingerprint;

/// A stored HTTP transaction with full metadata
///
/// `expires_at` is fixed when the record is written; freshness is always
/// judged against it, never recomputed from a different rule.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    /// Request identity
    pub fingerprint: Fingerprint,
    /// Request method
    pub method: String,
    /// Original request URL (what invalidation patterns match against)
    pub url: String,
    /// Response status code
    pub status: u16,
    /// Response headers, lowercase names, in arrival order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
    /// `ETag` validator
    pub etag: Option<String>,
    /// `Last-Modified` validator
    pub last_modified: Option<String>,
    /// When the record was written or last revalidated
    pub stored_at: SystemTime,
    /// When the record stops being fresh
    pub expires_at: SystemTime,
    /// Approximate footprint in bytes
    pub size: usize,
}

impl CacheRecord {
    /// Create a record, pulling validators out of the headers
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fingerprint: Fingerprint,
        method: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
        stored_at: SystemTime,
        expires_at: SystemTime,
    ) -> Self {
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        let mut record = Self {
            fingerprint,
            method: method.into(),
            url: url.into(),
            status,
            etag: None,
            last_modified: None,
            headers,
            body,
            stored_at,
            expires_at,
            size: 0,
        };
        record.etag = record.header("etag").map(str::to_string);
        record.last_modified = record.header("last-modified").map(str::to_string);
        record.size = record.compute_size();
        record
    }

    /// First header value with the given (case-insensitive) name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether a conditional request can be issued for this record
    pub fn has_validator(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }

    /// Check if the record has expired at `now`
    ///
    /// A record whose expiry equals its stored time is expired immediately.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Time since the record was stored
    pub fn age_at(&self, now: SystemTime) -> Duration {
        now.duration_since(self.stored_at).unwrap_or_default()
    }

    /// Remaining freshness lifetime
    pub fn ttl_remaining(&self, now: SystemTime) -> Option<Duration> {
        self.expires_at.duration_since(now).ok()
    }

    /// Apply a successful revalidation, keeping the body
    pub fn apply_refresh(&mut self, refresh: &RecordRefresh) {
        refresh.merge_headers(&mut self.headers);
        if let Some(etag) = &refresh.etag {
            self.etag = Some(etag.clone());
        }
        if let Some(last_modified) = &refresh.last_modified {
            self.last_modified = Some(last_modified.clone());
        }
        self.stored_at = refresh.stored_at;
        self.expires_at = refresh.expires_at;
        self.size = self.compute_size();
    }

    fn compute_size(&self) -> usize {
        self.body.len() + headers_size(&self.headers) + self.url.len()
    }
}

/// Bytes taken by header names and values
pub fn headers_size(headers: &[(String, String)]) -> usize {
    headers.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Metadata written back after a `304 Not Modified`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRefresh {
    /// Headers from the 304 response, merged over the stored ones
    pub headers: Vec<(String, String)>,
    /// New `ETag`, if the server sent one
    pub etag: Option<String>,
    /// New `Last-Modified`, if the server sent one
    pub last_modified: Option<String>,
    /// Revalidation time
    pub stored_at: SystemTime,
    /// Newly derived expiry
    pub expires_at: SystemTime,
}

impl RecordRefresh {
    /// Overlay these headers on a stored header list
    pub fn merge_headers(&self, headers: &mut Vec<(String, String)>) {
        for (name, value) in &self.headers {
            let name = name.to_ascii_lowercase();
            match headers.iter_mut().find(|(k, _)| *k == name) {
                Some(slot) => slot.1 = value.clone(),
                None => headers.push((name, value.clone())),
            }
        }
    }
}

/// Lightweight listing of a stored record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub fingerprint: Fingerprint,
    pub url: String,
    pub stored_at: SystemTime,
    pub expires_at: SystemTime,
    pub size: usize,
}

impl From<&CacheRecord> for RecordSummary {
    fn from(record: &CacheRecord) -> Self {
        Self {
            fingerprint: record.fingerprint.clone(),
            url: record.url.clone(),
            stored_at: record.stored_at,
            expires_at: record.expires_at,
            size: record.size,
        }
    }
}
