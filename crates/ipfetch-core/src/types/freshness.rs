//! Freshness classification of a stored record

use serde::{Deserialize, Serialize};

/// Whether a stored record can be served without contacting the origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Within its stored expiry; serve as-is
    Fresh,
    /// Expired, but carries an `ETag` or `Last-Modified` to revalidate with
    StaleRevalidatable,
    /// Expired with nothing to revalidate; refetch unconditionally
    ExpiredNoValidator,
}

impl Freshness {
    /// Whether the record may be returned without a transport call
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh)
    }

    /// Label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::StaleRevalidatable => "stale_revalidatable",
            Freshness::ExpiredNoValidator => "expired_no_validator",
        }
    }
}
