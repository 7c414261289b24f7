//! In-memory cache store using DashMap

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use ipfetch_core::{
    CacheRecord, CacheStats, CacheStore, Fingerprint, RecordRefresh, RecordSummary, Result,
    UrlPattern,
};

/// Configuration for the memory store
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of records (0 = unlimited)
    pub max_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

impl MemoryConfig {
    /// Create config with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            max_capacity: capacity,
        }
    }

    /// Create config with unlimited capacity
    pub fn unlimited() -> Self {
        Self { max_capacity: 0 }
    }
}

/// Internal statistics tracking
#[derive(Debug, Default)]
struct Counters {
    writes: u64,
    deletes: u64,
    evictions: u64,
}

/// A record tagged with the sequence number of the write that produced it
#[derive(Debug, Clone)]
struct Slot {
    record: CacheRecord,
    seq: u64,
}

/// In-memory cache store
///
/// Uses `DashMap` so writes to distinct fingerprints only contend on their
/// shard. Every write takes a sequence number when it starts; bulk deletions
/// capture the counter first and skip anything written at or after it.
/// Cloning creates a new handle to the SAME underlying store.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<DashMap<Fingerprint, Slot>>,
    next_seq: Arc<AtomicU64>,
    counters: Arc<RwLock<Counters>>,
    config: MemoryConfig,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new(config: MemoryConfig) -> Self {
        let capacity = match config.max_capacity {
            0 => 1_024,
            n => n.min(10_000),
        };
        Self {
            data: Arc::new(DashMap::with_capacity(capacity)),
            next_seq: Arc::new(AtomicU64::new(0)),
            counters: Arc::new(RwLock::new(Counters::default())),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    /// Evict the oldest records if inserting `incoming` would exceed capacity
    fn maybe_evict(&self, incoming: &Fingerprint) -> u64 {
        let max = self.config.max_capacity;
        if max == 0 || self.data.len() < max || self.data.contains_key(incoming) {
            return 0;
        }

        let mut by_age: Vec<(SystemTime, Fingerprint)> = self
            .data
            .iter()
            .map(|slot| (slot.record.stored_at, slot.key().clone()))
            .collect();
        by_age.sort();

        let excess = self.data.len() + 1 - max;
        let mut evicted = 0;
        for (_, fingerprint) in by_age.into_iter().take(excess) {
            if self.data.remove(&fingerprint).is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::debug!(target: "ipfetch", evicted, max, "memory store at capacity");
            self.counters.write().evictions += evicted;
        }
        evicted
    }

    /// Remove every slot written before `cutoff` that satisfies `doomed`
    fn remove_where(&self, cutoff: u64, doomed: impl Fn(&CacheRecord) -> bool) -> u64 {
        let mut removed = 0;
        self.data.retain(|_, slot| {
            let drop = slot.seq < cutoff && doomed(&slot.record);
            if drop {
                removed += 1;
            }
            !drop
        });
        removed
    }

    /// Get approximate memory usage
    pub fn memory_usage(&self) -> usize {
        self.data
            .iter()
            .map(|slot| slot.record.size + slot.key().as_str().len())
            .sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheRecord>> {
        Ok(self.data.get(fingerprint).map(|slot| slot.record.clone()))
    }

    async fn put(&self, record: CacheRecord) -> Result<u64> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let evicted = self.maybe_evict(&record.fingerprint);
        self.data
            .insert(record.fingerprint.clone(), Slot { record, seq });
        self.counters.write().writes += 1;
        Ok(evicted)
    }

    async fn refresh(&self, fingerprint: &Fingerprint, refresh: &RecordRefresh) -> Result<bool> {
        match self.data.get_mut(fingerprint) {
            Some(mut slot) => {
                slot.record.apply_refresh(refresh);
                slot.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                self.counters.write().writes += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let existed = self.data.remove(fingerprint).is_some();
        if existed {
            self.counters.write().deletes += 1;
        }
        Ok(existed)
    }

    async fn delete_matching(&self, pattern: &UrlPattern) -> Result<u64> {
        let cutoff = self.next_seq.load(Ordering::SeqCst);
        let removed = self.remove_where(cutoff, |record| pattern.matches(&record.url));
        self.counters.write().deletes += removed;
        Ok(removed)
    }

    async fn clear(&self) -> Result<u64> {
        let cutoff = self.next_seq.load(Ordering::SeqCst);
        let removed = self.remove_where(cutoff, |_| true);
        self.counters.write().deletes += removed;
        Ok(removed)
    }

    async fn evict_stored_before(&self, before: SystemTime) -> Result<u64> {
        let cutoff = self.next_seq.load(Ordering::SeqCst);
        let removed = self.remove_where(cutoff, |record| record.stored_at < before);
        self.counters.write().evictions += removed;
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<RecordSummary>> {
        Ok(self
            .data
            .iter()
            .map(|slot| RecordSummary::from(&slot.record))
            .collect())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let counters = self.counters.read();
        Ok(CacheStats {
            writes: counters.writes,
            deletes: counters.deletes,
            evictions: counters.evictions,
            entries: self.data.len(),
            size_bytes: self.memory_usage() as u64,
            ..Default::default()
        })
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.data.len())
    }
}
