//! Core types for cache operations

mod fingerprint;
mod freshness;
mod pattern;
mod record;
mod stats;

pub use fingerprint::Fingerprint;
pub use freshness::Freshness;
pub use pattern::UrlPattern;
pub use record::{CacheRecord, RecordRefresh, RecordSummary, headers_size};
pub use stats::{CacheStats, StatsReport};
