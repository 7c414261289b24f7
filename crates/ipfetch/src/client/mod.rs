//! Request orchestrator

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use ipfetch_core::{
    CacheError, CacheMetrics, CacheOperation, CacheRecord, CacheStats, CacheStore, Clock,
    EvictionReason, FetchError, Fingerprint, Freshness, NoopMetrics, RecordRefresh, SystemClock,
    UrlPattern,
};
use ipfetch_http::{
    CacheStatus, ExpiryPolicy, Fingerprinter, PreparedRequest, Request, Response,
    ResponseDirectives, RetryPolicy, TransportResponse, error_for_status, evaluate, header_map,
    is_cacheable, method_is_cacheable,
};
use ipfetch_storage::MemoryStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConfigError, DEFAULT_ACCEPT_LANGUAGE};
use crate::transport::{ReqwestTransport, Transport};

mod coalescer;
use coalescer::Coalescer;

/// Per-client running tally
#[derive(Debug, Default)]
struct Tally {
    hits: AtomicU64,
    misses: AtomicU64,
    revalidations: AtomicU64,
}

struct Inner {
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn CacheMetrics>,
    fingerprinter: Fingerprinter,
    retry: RetryPolicy,
    base_url: Option<String>,
    default_headers: HeaderMap,
    cache_enabled: AtomicBool,
    ttl: RwLock<Option<Duration>>,
    ignore_server_directives: bool,
    coalescer: Coalescer,
    tally: Tally,
}

/// Caching, coalescing, retrying HTTP client
///
/// One instance is meant to be shared by a connector; clones share the
/// store, the transport and the in-flight table.
///
/// # Example
///
/// ```rust,no_run
/// use ipfetch::prelude::*;
///
/// # async fn run() -> std::result::Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig {
///     ttl_seconds: Some(3600),
///     ..ClientConfig::for_source("uspto", "https://api.uspto.gov")
/// };
/// let client = Client::builder().config(config).build().await?;
///
/// let response = client.fetch(Request::get("/patents/US1234567")).await?;
/// println!("{} ({:?})", response.status, response.cache_status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

/// Builder for [`Client`]
///
/// Anything not supplied is derived from the [`ClientConfig`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn CacheStore>>,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Arc<dyn CacheMetrics>>,
}

impl ClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this store instead of opening one at the configured location
    pub fn store<S: CacheStore>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn shared_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn metrics<M: CacheMetrics>(mut self, metrics: M) -> Self {
        self.metrics = Some(Arc::new(metrics));
        self
    }

    /// Validate the configuration and assemble the client
    ///
    /// An unusable cache location is not an error: the client logs a warning
    /// and keeps responses in memory instead.
    pub async fn build(self) -> Result<Client, ConfigError> {
        let config = self.config;
        config.validate()?;

        let default_headers = default_headers(&config)?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(config.timeout(), config.max_redirects)?),
        };
        let store = match self.store {
            Some(store) => store,
            None => open_store(&config).await,
        };

        let inner = Inner {
            store,
            transport,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            metrics: self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            fingerprinter: Fingerprinter::new(&config.vary_headers),
            retry: config.retry.policy(),
            base_url: config.normalized_base_url(),
            default_headers,
            cache_enabled: AtomicBool::new(config.use_cache),
            ttl: RwLock::new(config.default_ttl()),
            ignore_server_directives: config.ignore_server_directives,
            coalescer: Coalescer::new(),
            tally: Tally::default(),
        };
        Ok(Client {
            inner: Arc::new(inner),
        })
    }
}

fn default_headers(config: &ClientConfig) -> Result<HeaderMap, ConfigError> {
    let invalid = |field: &'static str, reason: String| ConfigError::Invalid { field, reason };

    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .map_err(|e| invalid("user_agent", e.to_string()))?,
    );
    headers.insert(
        http::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
    );
    for (name, value) in &config.default_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| invalid("default_headers", format!("invalid header name {name:?}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| invalid("default_headers", format!("invalid value for {name}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

async fn open_store(config: &ClientConfig) -> Arc<dyn CacheStore> {
    if !config.use_cache {
        return Arc::new(MemoryStore::with_defaults());
    }

    #[cfg(feature = "sqlite")]
    {
        use ipfetch_storage::{SqliteConfig, SqliteStore};

        let path = config.cache_path();
        let sqlite = SqliteConfig::new(path.clone());
        #[cfg(feature = "compression")]
        let sqlite = sqlite.compression(ipfetch_core::BodyCompression::zstd());

        match SqliteStore::open(sqlite).await {
            Ok(store) => {
                info!(target: "ipfetch", path = %path.display(), "opened response cache");
                return Arc::new(store);
            }
            Err(e) => warn!(
                target: "ipfetch",
                path = %path.display(),
                error = %e,
                "cache location unavailable, keeping responses in memory"
            ),
        }
    }

    Arc::new(MemoryStore::with_defaults())
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Build a client from configuration alone
    pub async fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::builder().config(config).build().await
    }

    /// Issue a request, serving it from the cache when possible
    ///
    /// Fails with `Validation` before any I/O if the request is malformed.
    /// Cache-store failures never fail a fetch; they degrade to a miss.
    pub async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        let inner = &self.inner;
        let prepared = request.prepare(inner.base_url.as_deref(), &inner.default_headers)?;

        // Methods that are never stored are never shared between callers either
        if !self.is_cache_enabled() || !method_is_cacheable(&prepared.method) {
            let raw = inner.send_with_retry(&prepared).await?;
            debug!(
                target: "ipfetch",
                url = %prepared.url,
                method = %prepared.method,
                "cache bypassed"
            );
            return Ok(Response::from_transport(raw, CacheStatus::Bypass));
        }

        let fingerprint = inner.fingerprinter.fingerprint(&prepared);
        let url = prepared.url.to_string();

        if let Some(record) = inner.lookup(&fingerprint).await {
            if evaluate(&record, inner.clock.now()).is_fresh() {
                inner.tally.hits.fetch_add(1, Ordering::Relaxed);
                inner.metrics.record_hit(&url);
                debug!(target: "ipfetch", url = %url, fingerprint = fingerprint.short(), "cache hit");
                return Ok(Response::from_record(&record, CacheStatus::Hit));
            }
        }

        let leader = Arc::clone(inner);
        let key = fingerprint.clone();
        let response = inner
            .coalescer
            .run(&fingerprint, move || async move { leader.resolve(key, prepared).await })
            .await?;

        // Anyone who got here found no usable record of their own
        inner.tally.misses.fetch_add(1, Ordering::Relaxed);
        inner.metrics.record_miss(&url);
        debug!(
            target: "ipfetch",
            url = %url,
            fingerprint = fingerprint.short(),
            status = ?response.cache_status,
            "cache miss"
        );
        Ok(response)
    }

    /// Shorthand for `fetch(Request::get(url))`
    pub async fn get(&self, url: &str) -> Result<Response, FetchError> {
        self.fetch(Request::get(url)).await
    }

    /// Change the default lifetime for responses stored from now on
    ///
    /// Records already stored keep the expiry they were written with.
    pub fn set_ttl(&self, ttl: Option<Duration>) {
        *self.inner.ttl.write() = ttl;
    }

    pub fn ttl(&self) -> Option<Duration> {
        *self.inner.ttl.read()
    }

    pub fn enable_cache(&self) {
        self.inner.cache_enabled.store(true, Ordering::SeqCst);
    }

    /// Stop consulting and populating the cache for this client
    pub fn disable_cache(&self) {
        self.inner.cache_enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.inner.cache_enabled.load(Ordering::SeqCst)
    }

    /// Running statistics
    ///
    /// Hit and miss counts are this client's; entry count and size come from
    /// the store and fall back to zero if it cannot be read.
    pub async fn cache_stats(&self) -> CacheStats {
        let inner = &self.inner;
        let mut stats = match inner.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(target: "ipfetch", error = %e, "failed to read cache statistics");
                CacheStats::default()
            }
        };
        stats.hits = inner.tally.hits.load(Ordering::Relaxed);
        stats.misses = inner.tally.misses.load(Ordering::Relaxed);
        stats.revalidations = inner.tally.revalidations.load(Ordering::Relaxed);
        stats
    }

    /// Delete every stored response
    pub async fn clear_cache(&self) -> Result<u64, CacheError> {
        let started = Instant::now();
        let removed = self.inner.store.clear().await?;
        self.inner
            .metrics
            .record_latency(CacheOperation::Clear, started.elapsed());
        self.inner.metrics.record_eviction(EvictionReason::Cleared, removed);
        info!(target: "ipfetch", removed, "cache cleared");
        Ok(removed)
    }

    /// Delete responses stored more than `max_age` ago
    pub async fn clear_expired(&self, max_age: Duration) -> Result<u64, CacheError> {
        let cutoff = self
            .inner
            .clock
            .now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let removed = self.inner.store.evict_stored_before(cutoff).await?;
        self.inner.metrics.record_eviction(EvictionReason::Expired, removed);
        info!(target: "ipfetch", removed, max_age_secs = max_age.as_secs(), "expired responses cleared");
        Ok(removed)
    }

    /// Delete responses whose request URL matches the regular expression `pattern`
    pub async fn invalidate(&self, pattern: &str) -> Result<u64, CacheError> {
        let pattern = UrlPattern::new(pattern)?;
        let started = Instant::now();
        let removed = self.inner.store.delete_matching(&pattern).await?;
        self.inner
            .metrics
            .record_latency(CacheOperation::Invalidate, started.elapsed());
        self.inner
            .metrics
            .record_eviction(EvictionReason::Invalidated, removed);
        info!(target: "ipfetch", pattern = pattern.as_str(), removed, "cache invalidated");
        Ok(removed)
    }

    /// Number of outbound transactions currently running
    pub fn in_flight(&self) -> usize {
        self.inner.coalescer.in_flight()
    }

    /// Wait for running transactions to finish, then release this handle
    ///
    /// The connection pool is closed once the last clone is gone.
    pub async fn shutdown(self) {
        self.inner.coalescer.wait_idle().await;
        debug!(target: "ipfetch", "client shut down");
    }
}

impl Inner {
    fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::new(*self.ttl.read()).ignore_server_directives(self.ignore_server_directives)
    }

    /// Store read that degrades to a miss
    async fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheRecord> {
        let started = Instant::now();
        let result = self.store.get(fingerprint).await;
        self.metrics
            .record_latency(CacheOperation::Lookup, started.elapsed());
        match result {
            Ok(record) => record,
            Err(e) => {
                self.note_dropped(&e);
                warn!(
                    target: "ipfetch",
                    fingerprint = fingerprint.short(),
                    error = %e,
                    "cache lookup failed, treating as miss"
                );
                None
            }
        }
    }

    /// The store deletes records it cannot decode; report those as evictions
    fn note_dropped(&self, error: &CacheError) {
        if matches!(error, CacheError::Corrupt { .. }) {
            self.metrics.record_eviction(EvictionReason::Corrupt, 1);
        }
    }

    /// One outbound transaction, run by the ticket owner
    async fn resolve(
        self: Arc<Self>,
        fingerprint: Fingerprint,
        request: PreparedRequest,
    ) -> Result<Response, FetchError> {
        // A transaction that finished just before this ticket was created may
        // have stored a fresh record already
        let cached = self.lookup(&fingerprint).await;
        let had_record = cached.is_some();
        let stale = match cached {
            Some(record) => match evaluate(&record, self.clock.now()) {
                Freshness::Fresh => return Ok(Response::from_record(&record, CacheStatus::Hit)),
                Freshness::StaleRevalidatable => Some(record),
                Freshness::ExpiredNoValidator => None,
            },
            None => None,
        };

        let raw = match &stale {
            Some(record) => {
                let conditional =
                    request.conditional(record.etag.as_deref(), record.last_modified.as_deref());
                self.send_with_retry(&conditional).await?
            }
            None => self.send_with_retry(&request).await?,
        };

        if raw.status == StatusCode::NOT_MODIFIED {
            if let Some(record) = stale {
                return Ok(self.revalidate(record, raw).await);
            }
        }

        self.store_response(&fingerprint, &request, &raw, had_record)
            .await;
        Ok(Response::from_transport(raw, CacheStatus::Miss))
    }

    /// Keep the stored body and refresh validators and expiry from a `304`
    async fn revalidate(&self, mut record: CacheRecord, raw: TransportResponse) -> Response {
        let now = self.clock.now();
        let mut refresh = RecordRefresh {
            headers: raw.header_pairs(),
            etag: header_text(&raw.headers, http::header::ETAG),
            last_modified: header_text(&raw.headers, http::header::LAST_MODIFIED),
            stored_at: now,
            expires_at: now,
        };

        let mut merged = record.headers.clone();
        refresh.merge_headers(&mut merged);
        let directives = ResponseDirectives::from_headers(&header_map(&merged));
        refresh.expires_at = self
            .expiry_policy()
            .expires_at(&directives, now)
            .unwrap_or(now);

        match self.store.refresh(&record.fingerprint, &refresh).await {
            Ok(true) => {}
            // Cleared while the request was out; not put back
            Ok(false) => debug!(
                target: "ipfetch",
                fingerprint = record.fingerprint.short(),
                "revalidated record no longer stored"
            ),
            Err(e) => {
                self.note_dropped(&e);
                warn!(
                    target: "ipfetch",
                    fingerprint = record.fingerprint.short(),
                    error = %e,
                    "failed to refresh revalidated record"
                );
            }
        }

        self.tally.revalidations.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_revalidated(&record.url);
        record.apply_refresh(&refresh);
        Response::from_record(&record, CacheStatus::Revalidated)
    }

    /// Write a response if it may be cached; failures are logged only
    async fn store_response(
        &self,
        fingerprint: &Fingerprint,
        request: &PreparedRequest,
        raw: &TransportResponse,
        had_record: bool,
    ) {
        let now = self.clock.now();
        let directives = ResponseDirectives::from_headers(&raw.headers);
        let expires_at = if is_cacheable(&request.method, raw.status, &directives) {
            self.expiry_policy().expires_at(&directives, now)
        } else {
            None
        };

        let Some(expires_at) = expires_at else {
            // An expired copy must not outlive a response that replaced it
            if had_record {
                if let Err(e) = self.store.delete(fingerprint).await {
                    warn!(target: "ipfetch", error = %e, "failed to drop superseded record");
                }
            }
            debug!(target: "ipfetch", url = %request.url, status = raw.status.as_u16(), "response not stored");
            return;
        };

        let record = CacheRecord::new(
            fingerprint.clone(),
            request.method.as_str(),
            request.url.as_str(),
            raw.status.as_u16(),
            raw.header_pairs(),
            raw.body.clone(),
            now,
            expires_at,
        );
        let started = Instant::now();
        let result = self.store.put(record).await;
        self.metrics
            .record_latency(CacheOperation::Store, started.elapsed());
        match result {
            Ok(0) => {}
            Ok(evicted) => self
                .metrics
                .record_eviction(EvictionReason::Capacity, evicted),
            Err(e) => warn!(
                target: "ipfetch",
                fingerprint = fingerprint.short(),
                error = %e,
                "failed to store response"
            ),
        }
    }

    /// Transport call plus status mapping, under the retry policy
    async fn send_with_retry(&self, request: &PreparedRequest) -> Result<TransportResponse, FetchError> {
        self.retry
            .execute(
                |attempt| {
                    let request = request.clone();
                    async move {
                        let started = Instant::now();
                        let result = self.transport.send(request).await;
                        self.metrics
                            .record_latency(CacheOperation::Transport, started.elapsed());
                        let raw = result?;
                        debug!(
                            target: "ipfetch",
                            attempt,
                            status = raw.status.as_u16(),
                            url = %raw.url,
                            "transport response"
                        );
                        match error_for_status(&raw, self.clock.now()) {
                            Some(error) => Err(error),
                            None => Ok(raw),
                        }
                    }
                },
                |attempt, delay, _| self.metrics.record_retry(attempt, delay),
            )
            .await
    }
}

fn header_text(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
