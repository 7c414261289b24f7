use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use ipfetch::prelude::*;
use ipfetch::{MemoryStore, PreparedRequest, Transport, TransportResponse};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Slow local "server" that counts how often it is reached
#[derive(Clone, Default)]
struct SlowOrigin {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for SlowOrigin {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        println!("origin hit #{n}: {}", request.url);
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(TransportResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(br#"{"family_id":"12345"}"#),
            url: request.url.to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let origin = SlowOrigin::default();
    let client = Client::builder()
        .config(ClientConfig {
            ttl_seconds: Some(600),
            ..ClientConfig::for_source("coalescing-demo", "https://ops.example.org/3.2")
        })
        .store(MemoryStore::with_defaults())
        .transport(origin.clone())
        .build()
        .await?;

    println!("Spawning 10 concurrent fetches of the same family...");
    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.fetch(Request::get("/family/EP1000000")).await
        }));
    }

    for handle in handles {
        let response = handle.await??;
        assert_eq!(response.text(), r#"{"family_id":"12345"}"#);
    }

    let calls = origin.calls.load(Ordering::SeqCst);
    println!("Outbound calls: {calls}");
    if calls != 1 {
        return Err(format!("expected 1 outbound call, got {calls}").into());
    }

    let again = client.fetch(Request::get("/family/EP1000000")).await?;
    println!("Follow-up fetch: {:?}", again.cache_status);

    client.shutdown().await;
    Ok(())
}
