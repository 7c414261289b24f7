use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use ipfetch::prelude::*;
use ipfetch::{MemoryStore, MetricsCrateAdapter, PreparedRequest, Transport, TransportResponse};

struct Fixture;

#[async_trait]
impl Transport for Fixture {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, FetchError> {
        Ok(TransportResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"[]"),
            url: request.url.to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Counters go to whatever `metrics` recorder is installed; none here,
    // so this only shows the wiring.
    let client = Client::builder()
        .config(ClientConfig {
            ttl_seconds: Some(60),
            ..Default::default()
        })
        .store(MemoryStore::with_defaults())
        .transport(Fixture)
        .metrics(MetricsCrateAdapter::new("ipfetch"))
        .build()
        .await?;

    for _ in 0..3 {
        client.get("https://api.example.com/classes/H01L").await?;
    }

    let control = ControlCommand::from_call("cache_stats", serde_json::Value::Null)?;
    let output = client.execute(control).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
