use crate::{CacheMetrics, CacheOperation, EvictionReason};
use std::time::Duration;
use tracing::{debug, trace};

/// Metrics adapter that logs events via `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    /// Connector name (optional)
    source: Option<String>,
}

impl TracingMetrics {
    /// Create new tracing metrics adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Label events with the connector that owns the client
    pub fn with_source(mut self, name: impl Into<String>) -> Self {
        self.source = Some(name.into());
        self
    }
}

impl CacheMetrics for TracingMetrics {
    fn record_hit(&self, url: &str) {
        debug!(
            target: "ipfetch",
            event = "hit",
            url = %url,
            source = ?self.source,
            "Cache Hit"
        );
    }

    fn record_miss(&self, url: &str) {
        debug!(
            target: "ipfetch",
            event = "miss",
            url = %url,
            source = ?self.source,
            "Cache Miss"
        );
    }

    fn record_revalidated(&self, url: &str) {
        debug!(
            target: "ipfetch",
            event = "revalidated",
            url = %url,
            source = ?self.source,
            "Cache Revalidated"
        );
    }

    fn record_retry(&self, attempt: u32, delay: Duration) {
        debug!(
            target: "ipfetch",
            event = "retry",
            attempt,
            delay_ms = delay.as_millis(),
            source = ?self.source,
            "Retry Scheduled"
        );
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        trace!(
            target: "ipfetch",
            event = "latency",
            operation = operation.as_str(),
            duration_ms = duration.as_millis(),
            source = ?self.source,
            "Operation Latency"
        );
    }

    fn record_eviction(&self, reason: EvictionReason, count: u64) {
        debug!(
            target: "ipfetch",
            event = "eviction",
            reason = reason.as_str(),
            count,
            source = ?self.source,
            "Cache Eviction"
        );
    }
}
