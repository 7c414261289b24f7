//! Core traits for cache operations

mod clock;
mod metrics;
mod store;
mod tracing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use metrics::{CacheMetrics, CacheOperation, EvictionReason, NoopMetrics};
pub use store::CacheStore;
pub use tracing::TracingMetrics;

#[cfg(feature = "metrics")]
pub use metrics::MetricsCrateAdapter;
