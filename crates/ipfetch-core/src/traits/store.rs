//! Cache store trait

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

use crate::{CacheError, CacheRecord, CacheStats, Fingerprint, RecordRefresh, RecordSummary, UrlPattern};

/// Storage contract for cached HTTP transactions
///
/// Implementations must be safe to call concurrently, and writes to distinct
/// fingerprints must not block each other. Bulk deletions (`delete_matching`,
/// `clear`, `evict_stored_before`) only consider records whose write finished
/// before the call began.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Get a record
    ///
    /// Returns `None` if the fingerprint is unknown. Expired records are still
    /// returned; freshness is the caller's decision. A record that cannot be
    /// decoded is deleted and reported as [`CacheError::Corrupt`].
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheRecord>, CacheError>;

    /// Insert or overwrite a record
    ///
    /// Returns how many other records were evicted to stay within capacity.
    async fn put(&self, record: CacheRecord) -> Result<u64, CacheError>;

    /// Update validators and timestamps in place without rewriting the body
    ///
    /// Returns `false` if the record no longer exists. A stored record that
    /// cannot be decoded is deleted and reported as [`CacheError::Corrupt`].
    async fn refresh(
        &self,
        fingerprint: &Fingerprint,
        refresh: &RecordRefresh,
    ) -> Result<bool, CacheError>;

    /// Delete a record
    ///
    /// Returns `true` if the record existed and was deleted.
    async fn delete(&self, fingerprint: &Fingerprint) -> Result<bool, CacheError>;

    /// Delete every record whose original request URL matches `pattern`
    async fn delete_matching(&self, pattern: &UrlPattern) -> Result<u64, CacheError>;

    /// Delete all records
    async fn clear(&self) -> Result<u64, CacheError>;

    /// Delete records stored before `cutoff`
    async fn evict_stored_before(&self, cutoff: SystemTime) -> Result<u64, CacheError>;

    /// Delete records older than `max_age` by wall-clock time
    async fn evict_older_than(&self, max_age: Duration) -> Result<u64, CacheError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.evict_stored_before(cutoff).await
    }

    /// Enumerate stored records
    async fn list(&self) -> Result<Vec<RecordSummary>, CacheError>;

    /// Get store statistics
    async fn stats(&self) -> Result<CacheStats, CacheError>;

    /// Get the number of records
    async fn len(&self) -> Result<usize, CacheError>;

    /// Check if the store is empty
    async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}
