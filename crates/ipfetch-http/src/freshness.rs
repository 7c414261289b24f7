//! Freshness policy

use ipfetch_core::{CacheRecord, Freshness};
use std::time::SystemTime;

/// Classify a stored record at `now`
///
/// Uses only the expiry captured when the record was written.
pub fn evaluate(record: &CacheRecord, now: SystemTime) -> Freshness {
    if !record.is_expired_at(now) {
        Freshness::Fresh
    } else if record.has_validator() {
        Freshness::StaleRevalidatable
    } else {
        Freshness::ExpiredNoValidator
    }
}
