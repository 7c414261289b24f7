//! Metrics trait for cache observability

use std::time::Duration;

/// Operation for latency tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Lookup,
    Store,
    Transport,
    Invalidate,
    Clear,
}

impl CacheOperation {
    /// Get operation as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOperation::Lookup => "lookup",
            CacheOperation::Store => "store",
            CacheOperation::Transport => "transport",
            CacheOperation::Invalidate => "invalidate",
            CacheOperation::Clear => "clear",
        }
    }
}

/// Reason a record left the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Older than the requested maximum age
    Expired,
    /// Matched an invalidation pattern
    Invalidated,
    /// Bulk clear
    Cleared,
    /// Unreadable on disk
    Corrupt,
    /// Capacity limit reached
    Capacity,
}

impl EvictionReason {
    /// Get reason as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Expired => "expired",
            EvictionReason::Invalidated => "invalidated",
            EvictionReason::Cleared => "cleared",
            EvictionReason::Corrupt => "corrupt",
            EvictionReason::Capacity => "capacity",
        }
    }
}

/// Trait for cache metrics/observability
///
/// Implement this to integrate with your metrics system (Prometheus, StatsD, etc.)
pub trait CacheMetrics: Send + Sync + 'static {
    /// Record a fresh cache hit
    fn record_hit(&self, url: &str);

    /// Record a miss (absent, expired, or joined an in-flight fetch)
    fn record_miss(&self, url: &str);

    /// Record a stale record confirmed by a `304`
    fn record_revalidated(&self, url: &str);

    /// Record a retry about to be scheduled
    fn record_retry(&self, attempt: u32, delay: Duration);

    /// Record operation latency
    fn record_latency(&self, operation: CacheOperation, duration: Duration);

    /// Record removed records
    fn record_eviction(&self, reason: EvictionReason, count: u64);
}

/// No-op metrics implementation (default)
///
/// Zero overhead when metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    #[inline]
    fn record_hit(&self, _url: &str) {}

    #[inline]
    fn record_miss(&self, _url: &str) {}

    #[inline]
    fn record_revalidated(&self, _url: &str) {}

    #[inline]
    fn record_retry(&self, _attempt: u32, _delay: Duration) {}

    #[inline]
    fn record_latency(&self, _operation: CacheOperation, _duration: Duration) {}

    #[inline]
    fn record_eviction(&self, _reason: EvictionReason, _count: u64) {}
}

/// Metrics adapter using the `metrics` crate
///
/// Integrates with Prometheus, StatsD, and other exporters via the `metrics` ecosystem.
///
/// # Example
/// ```ignore
/// use ipfetch_core::MetricsCrateAdapter;
///
/// let metrics = MetricsCrateAdapter::new("ipfetch");
/// // Emits: ipfetch_hits_total, ipfetch_misses_total, etc.
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsCrateAdapter {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsCrateAdapter {
    /// Create a new adapter with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl CacheMetrics for MetricsCrateAdapter {
    fn record_hit(&self, _url: &str) {
        metrics::counter!(self.metric_name("hits_total")).increment(1);
    }

    fn record_miss(&self, _url: &str) {
        metrics::counter!(self.metric_name("misses_total")).increment(1);
    }

    fn record_revalidated(&self, _url: &str) {
        metrics::counter!(self.metric_name("revalidations_total")).increment(1);
    }

    fn record_retry(&self, _attempt: u32, delay: Duration) {
        metrics::counter!(self.metric_name("retries_total")).increment(1);
        metrics::histogram!(self.metric_name("retry_delay_seconds")).record(delay.as_secs_f64());
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        metrics::histogram!(
            self.metric_name("operation_duration_seconds"),
            "operation" => operation.as_str()
        )
        .record(duration.as_secs_f64());
    }

    fn record_eviction(&self, reason: EvictionReason, count: u64) {
        metrics::counter!(
            self.metric_name("evictions_total"),
            "reason" => reason.as_str()
        )
        .increment(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_as_str() {
        assert_eq!(CacheOperation::Lookup.as_str(), "lookup");
        assert_eq!(CacheOperation::Transport.as_str(), "transport");
    }

    #[test]
    fn test_eviction_reason_as_str() {
        assert_eq!(EvictionReason::Expired.as_str(), "expired");
        assert_eq!(EvictionReason::Invalidated.as_str(), "invalidated");
    }

    #[test]
    fn test_noop_metrics() {
        let metrics = NoopMetrics;
        metrics.record_hit("https://example.com");
        metrics.record_miss("https://example.com");
        metrics.record_latency(CacheOperation::Lookup, Duration::from_millis(1));
        metrics.record_eviction(EvictionReason::Cleared, 3);
    }
}
