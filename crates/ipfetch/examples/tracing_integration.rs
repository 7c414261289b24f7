use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use ipfetch::prelude::*;
use ipfetch::{MemoryStore, PreparedRequest, TracingMetrics, Transport, TransportResponse};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

/// Fails once with 503, then serves a cacheable document
#[derive(Default)]
struct FlakyOrigin {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for FlakyOrigin {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, FetchError> {
        let first = self.calls.fetch_add(1, Ordering::SeqCst) == 0;
        let mut headers = HeaderMap::new();
        let (status, body) = if first {
            (StatusCode::SERVICE_UNAVAILABLE, "maintenance")
        } else {
            headers.insert("cache-control", HeaderValue::from_static("max-age=300"));
            (StatusCode::OK, r#"{"title":"Widget"}"#)
        };
        Ok(TransportResponse {
            status,
            headers,
            body: Bytes::from_static(body.as_bytes()),
            url: request.url.to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=ipfetch=trace shows latency events too
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ipfetch=debug")),
        )
        .init();

    let client = Client::builder()
        .config(ClientConfig {
            retry: RetryConfig {
                initial_backoff_ms: 200,
                jitter_ms: 100,
                ..Default::default()
            },
            ..ClientConfig::for_source("tracing-demo", "https://api.example.com")
        })
        .store(MemoryStore::with_defaults())
        .transport(FlakyOrigin::default())
        .metrics(TracingMetrics::new().with_source("tracing-demo"))
        .build()
        .await?;

    println!("First fetch (retries once, then misses)...");
    let first = client.get("/patents/US1").await?;
    println!("  {:?}: {}", first.cache_status, first.text());

    println!("Second fetch (hit)...");
    let second = client.get("/patents/US1").await?;
    println!("  {:?}: {}", second.cache_status, second.text());

    println!("Stats: {:?}", client.cache_stats().await.report());
    Ok(())
}
