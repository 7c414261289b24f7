//! Cache statistics

use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Statistics for cache operations
///
/// Process-scoped. Entry count and size are derived by scanning the store,
/// so they survive restarts; the counters do not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of stale records confirmed unchanged by the origin
    pub revalidations: u64,
    /// Number of write operations
    pub writes: u64,
    /// Number of delete operations
    pub deletes: u64,
    /// Number of evictions
    pub evictions: u64,
    /// Current number of entries
    pub entries: usize,
    /// Approximate storage footprint in bytes
    pub size_bytes: u64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate miss ratio (0.0 to 1.0)
    pub fn miss_ratio(&self) -> f64 {
        1.0 - self.hit_ratio()
    }

    /// Total requests (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Storage footprint in mebibytes
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }

    /// Condense into the caller-facing report
    pub fn report(&self) -> StatsReport {
        StatsReport {
            hit_rate: self.hit_ratio(),
            entry_count: self.entries as u64,
            size_mb: self.size_mb(),
        }
    }
}

/// Caller-facing statistics summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    /// Hits over total lookups, in `[0, 1]`
    pub hit_rate: f64,
    /// Records currently stored
    pub entry_count: u64,
    /// Storage footprint in mebibytes
    pub size_mb: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats() {
        let stats = CacheStats::default();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_ratio() - 0.8).abs() < f64::EPSILON);
        assert!((stats.miss_ratio() - 0.2).abs() < f64::EPSILON);
        assert_eq!(stats.total_requests(), 100);
    }

    #[test]
    fn test_report() {
        let stats = CacheStats {
            hits: 1,
            misses: 3,
            entries: 7,
            size_bytes: 2 * 1024 * 1024,
            ..Default::default()
        };
        let report = stats.report();
        assert!((report.hit_rate - 0.25).abs() < f64::EPSILON);
        assert_eq!(report.entry_count, 7);
        assert!((report.size_mb - 2.0).abs() < f64::EPSILON);

        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["entry_count"], 7);
    }
}
