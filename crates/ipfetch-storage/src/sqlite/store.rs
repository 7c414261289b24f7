//! Durable cache store backed by a single SQLite file.
//!
//! All statements run on tokio-rusqlite's connection thread, one closure at a
//! time, so a bulk deletion never sees a write queued after it.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio_rusqlite::rusqlite::{self, OptionalExtension};
use tokio_rusqlite::{Connection, params};

use ipfetch_core::{
    BodyCompression, CacheError, CacheRecord, CacheStats, CacheStore, Fingerprint, RecordRefresh,
    RecordSummary, Result, UrlPattern, headers_size,
};

use super::migrations;

/// Configuration for the SQLite store
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file; parent directories are created on open
    pub path: PathBuf,
    /// How long a statement waits on a lock held by another connection
    pub busy_timeout: Duration,
    /// Encoding for stored bodies
    pub compression: BodyCompression,
}

impl SqliteConfig {
    /// Create config for a database file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
            compression: BodyCompression::None,
        }
    }

    /// Set the busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set the body compression
    pub fn compression(mut self, compression: BodyCompression) -> Self {
        self.compression = compression;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    writes: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
}

/// What a refresh found under the fingerprint
enum Refreshed {
    Updated,
    Missing,
    /// Row could not be decoded and was deleted
    Dropped(String),
}

/// Row as read from disk, before decoding
struct RawRow {
    fingerprint: String,
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
    compressed: bool,
    etag: Option<String>,
    last_modified: Option<String>,
    stored_at_ms: i64,
    expires_at_ms: i64,
}

/// SQLite cache store
///
/// Cloning creates a new handle to the SAME connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
    compression: BodyCompression,
    counters: Arc<Counters>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("compression", &self.compression)
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database described by `config`
    ///
    /// Applies WAL pragmas and runs pending migrations.
    pub async fn open(config: SqliteConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::Connection(format!("create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(&config.path)
            .await
            .map_err(|e| CacheError::Connection(format!("open {}: {e}", config.path.display())))?;
        Self::prepare(conn, &config, Some(config.path.clone())).await
    }

    /// Open a private in-memory database with the same schema
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        Self::prepare(conn, &SqliteConfig::new(":memory:"), None).await
    }

    async fn prepare(conn: Connection, config: &SqliteConfig, path: Option<PathBuf>) -> Result<Self> {
        let busy_timeout = config.busy_timeout;
        conn.call(move |conn| -> std::result::Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;",
            )?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Connection(e.to_string()))?;

        migrations::run(&conn)
            .await
            .map_err(|e| CacheError::Connection(format!("migrate: {e}")))?;

        tracing::debug!(
            target: "ipfetch",
            path = ?path,
            compression = config.compression.name(),
            "opened sqlite cache"
        );
        Ok(Self {
            conn,
            compression: config.compression,
            counters: Arc::new(Counters::default()),
            path,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn decode(raw: RawRow) -> std::result::Result<CacheRecord, String> {
        let headers: Vec<(String, String)> =
            serde_json::from_str(&raw.headers_json).map_err(|e| format!("headers: {e}"))?;
        let body = BodyCompression::decode(&raw.body, raw.compressed).map_err(|e| e.to_string())?;
        let status = u16::try_from(raw.status).map_err(|_| format!("status {}", raw.status))?;

        let mut record = CacheRecord::new(
            Fingerprint::from_hex(raw.fingerprint),
            raw.method,
            raw.url,
            status,
            headers,
            Bytes::from(body),
            from_millis(raw.stored_at_ms),
            from_millis(raw.expires_at_ms),
        );
        // Validators may have been refreshed independently of the header list
        record.etag = raw.etag.or(record.etag);
        record.last_modified = raw.last_modified.or(record.last_modified);
        Ok(record)
    }
}

fn backend<E: std::fmt::Display>(e: E) -> CacheError {
    CacheError::Backend(e.to_string())
}

fn to_millis(t: SystemTime) -> i64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn from_millis(ms: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheRecord>> {
        let key = fingerprint.as_str().to_string();
        let raw = self
            .conn
            .call(move |conn| -> std::result::Result<Option<RawRow>, rusqlite::Error> {
                conn.query_row(
                    "SELECT fingerprint, method, url, status, headers_json, body, compressed,
                            etag, last_modified, stored_at_ms, expires_at_ms
                     FROM responses WHERE fingerprint = ?1",
                    params![key],
                    |row| {
                        Ok(RawRow {
                            fingerprint: row.get(0)?,
                            method: row.get(1)?,
                            url: row.get(2)?,
                            status: row.get(3)?,
                            headers_json: row.get(4)?,
                            body: row.get(5)?,
                            compressed: row.get::<_, i64>(6)? != 0,
                            etag: row.get(7)?,
                            last_modified: row.get(8)?,
                            stored_at_ms: row.get(9)?,
                            expires_at_ms: row.get(10)?,
                        })
                    },
                )
                .optional()
            })
            .await
            .map_err(backend)?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match Self::decode(raw) {
            Ok(record) => Ok(Some(record)),
            Err(reason) => {
                tracing::warn!(
                    target: "ipfetch",
                    fingerprint = fingerprint.short(),
                    %reason,
                    "dropping unreadable cache row"
                );
                self.delete(fingerprint).await?;
                Err(CacheError::Corrupt {
                    fingerprint: fingerprint.to_string(),
                    reason,
                })
            }
        }
    }

    async fn put(&self, record: CacheRecord) -> Result<u64> {
        let (body, compressed) = self.compression.encode(&record.body)?;
        let headers_json = serde_json::to_string(&record.headers).map_err(backend)?;

        self.conn
            .call(move |conn| -> std::result::Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO responses (
                        fingerprint, method, url, status, headers_json, body, compressed,
                        etag, last_modified, stored_at_ms, expires_at_ms, size
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    ON CONFLICT(fingerprint) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        compressed = excluded.compressed,
                        etag = excluded.etag,
                        last_modified = excluded.last_modified,
                        stored_at_ms = excluded.stored_at_ms,
                        expires_at_ms = excluded.expires_at_ms,
                        size = excluded.size",
                    params![
                        record.fingerprint.as_str(),
                        &record.method,
                        &record.url,
                        record.status,
                        headers_json,
                        body,
                        compressed as i64,
                        &record.etag,
                        &record.last_modified,
                        to_millis(record.stored_at),
                        to_millis(record.expires_at),
                        record.size as i64,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(backend)?;

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(0)
    }

    async fn refresh(&self, fingerprint: &Fingerprint, refresh: &RecordRefresh) -> Result<bool> {
        let key = fingerprint.as_str().to_string();
        let refresh = refresh.clone();

        let outcome = self
            .conn
            .call(move |conn| -> std::result::Result<Refreshed, rusqlite::Error> {
                let tx = conn.transaction()?;
                let current: Option<(String, i64)> = tx
                    .query_row(
                        "SELECT headers_json, size FROM responses WHERE fingerprint = ?1",
                        params![key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let Some((headers_json, size)) = current else {
                    return Ok(Refreshed::Missing);
                };

                let mut headers: Vec<(String, String)> = match serde_json::from_str(&headers_json) {
                    Ok(headers) => headers,
                    Err(e) => {
                        tx.execute("DELETE FROM responses WHERE fingerprint = ?1", params![key])?;
                        tx.commit()?;
                        return Ok(Refreshed::Dropped(format!("headers: {e}")));
                    }
                };
                let before = headers_size(&headers) as i64;
                refresh.merge_headers(&mut headers);
                let after = headers_size(&headers) as i64;
                let merged = serde_json::to_string(&headers)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

                tx.execute(
                    "UPDATE responses SET
                        headers_json = ?2,
                        etag = COALESCE(?3, etag),
                        last_modified = COALESCE(?4, last_modified),
                        stored_at_ms = ?5,
                        expires_at_ms = ?6,
                        size = ?7
                     WHERE fingerprint = ?1",
                    params![
                        key,
                        merged,
                        refresh.etag,
                        refresh.last_modified,
                        to_millis(refresh.stored_at),
                        to_millis(refresh.expires_at),
                        size - before + after,
                    ],
                )?;
                tx.commit()?;
                Ok(Refreshed::Updated)
            })
            .await
            .map_err(backend)?;

        match outcome {
            Refreshed::Updated => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Refreshed::Missing => Ok(false),
            Refreshed::Dropped(reason) => {
                tracing::warn!(
                    target: "ipfetch",
                    fingerprint = fingerprint.short(),
                    %reason,
                    "dropping unreadable cache row"
                );
                self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                Err(CacheError::Corrupt {
                    fingerprint: fingerprint.to_string(),
                    reason,
                })
            }
        }
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let key = fingerprint.as_str().to_string();
        let count = self
            .conn
            .call(move |conn| conn.execute("DELETE FROM responses WHERE fingerprint = ?1", params![key]))
            .await
            .map_err(backend)?;

        if count > 0 {
            self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(count > 0)
    }

    async fn delete_matching(&self, pattern: &UrlPattern) -> Result<u64> {
        let pattern = pattern.clone();
        let removed = self
            .conn
            .call(move |conn| -> std::result::Result<u64, rusqlite::Error> {
                let tx = conn.transaction()?;
                let doomed: Vec<String> = {
                    let mut stmt = tx.prepare("SELECT fingerprint, url FROM responses")?;
                    let rows = stmt.query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?;
                    let mut doomed = Vec::new();
                    for row in rows {
                        let (fingerprint, url) = row?;
                        if pattern.matches(&url) {
                            doomed.push(fingerprint);
                        }
                    }
                    doomed
                };

                let mut removed = 0u64;
                {
                    let mut stmt = tx.prepare("DELETE FROM responses WHERE fingerprint = ?1")?;
                    for fingerprint in &doomed {
                        removed += stmt.execute(params![fingerprint])? as u64;
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(backend)?;

        self.counters.deletes.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn clear(&self) -> Result<u64> {
        let removed = self
            .conn
            .call(|conn| conn.execute("DELETE FROM responses", []))
            .await
            .map_err(backend)? as u64;

        self.counters.deletes.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn evict_stored_before(&self, cutoff: SystemTime) -> Result<u64> {
        let cutoff_ms = to_millis(cutoff);
        let removed = self
            .conn
            .call(move |conn| {
                conn.execute("DELETE FROM responses WHERE stored_at_ms < ?1", params![cutoff_ms])
            })
            .await
            .map_err(backend)? as u64;

        self.counters.evictions.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<RecordSummary>> {
        self.conn
            .call(|conn| -> std::result::Result<Vec<RecordSummary>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT fingerprint, url, stored_at_ms, expires_at_ms, size
                     FROM responses ORDER BY stored_at_ms",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(RecordSummary {
                        fingerprint: Fingerprint::from_hex(row.get::<_, String>(0)?),
                        url: row.get(1)?,
                        stored_at: from_millis(row.get(2)?),
                        expires_at: from_millis(row.get(3)?),
                        size: usize::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
                    })
                })?;
                rows.collect()
            })
            .await
            .map_err(backend)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let (entries, size_bytes) = self
            .conn
            .call(|conn| {
                conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM responses",
                    [],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
            })
            .await
            .map_err(backend)?;

        Ok(CacheStats {
            writes: self.counters.writes.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: usize::try_from(entries).unwrap_or(0),
            size_bytes: u64::try_from(size_bytes).unwrap_or(0),
            ..Default::default()
        })
    }

    async fn len(&self) -> Result<usize> {
        let count = self
            .conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM responses", [], |row| row.get::<_, i64>(0)))
            .await
            .map_err(backend)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
