//! Talks to a real endpoint and keeps the response cache on disk.
//!
//! Run twice: the second run is served from the cache.

use ipfetch::prelude::*;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let client = Client::new(ClientConfig {
        ttl_seconds: Some(3600),
        ..ClientConfig::for_source("httpbin", "https://httpbin.org")
    })
    .await?;

    let response = client
        .fetch(
            Request::get("/get")
                .query("number", "US1234567")
                .header("accept", "application/json"),
        )
        .await?;
    println!("{} {:?}", response.status, response.cache_status);

    let body: serde_json::Value = response.json()?;
    println!("echoed args: {}", body["args"]);

    match client.get("/status/404").await {
        Err(FetchError::NotFound { url }) => println!("not found: {url}"),
        other => println!("unexpected: {other:?}"),
    }

    let report = client.cache_stats().await.report();
    println!(
        "hit rate {:.2}, {} entries, {:.3} MB",
        report.hit_rate, report.entry_count, report.size_mb
    );

    client.shutdown().await;
    Ok(())
}
