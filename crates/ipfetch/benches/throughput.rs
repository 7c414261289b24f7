//! Benchmarks for fingerprinting, store access and the cache-hit path

use async_trait::async_trait;
use bytes::Bytes;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use http::{HeaderMap, StatusCode};
use ipfetch::{
    CacheRecord, CacheStore, Client, ClientConfig, FetchError, Fingerprinter, MemoryStore,
    PreparedRequest, Request, Transport, TransportResponse,
};
use std::hint::black_box;
use std::time::{Duration, SystemTime};
use tokio::runtime::Runtime;

/// Answers every request locally
struct StaticTransport;

#[async_trait]
impl Transport for StaticTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, FetchError> {
        Ok(TransportResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(br#"{"patents":[]}"#),
            url: request.url.to_string(),
        })
    }
}

fn record(i: u64, fingerprinter: &Fingerprinter) -> CacheRecord {
    let url = format!("https://api.example.com/patents/US{i}");
    let prepared = Request::get(url.as_str())
        .prepare(None, &HeaderMap::new())
        .unwrap();
    let now = SystemTime::now();
    CacheRecord::new(
        fingerprinter.fingerprint(&prepared),
        "GET",
        url,
        200,
        vec![("content-type".to_string(), "application/json".to_string())],
        Bytes::from(vec![b'x'; 1024]),
        now,
        now + Duration::from_secs(3600),
    )
}

fn bench_fingerprint(c: &mut Criterion) {
    let fingerprinter = Fingerprinter::default();
    let get = Request::get("https://api.example.com/search")
        .query("q", "graphene")
        .query("page", 4)
        .header("accept", "application/json")
        .prepare(None, &HeaderMap::new())
        .unwrap();
    let post = Request::post("https://api.example.com/search")
        .json(&serde_json::json!({"q": "graphene", "filters": {"year": [2019, 2024]}}))
        .prepare(None, &HeaderMap::new())
        .unwrap();

    let mut group = c.benchmark_group("fingerprint");
    group.throughput(Throughput::Elements(1));
    group.bench_function("get_with_query", |b| {
        b.iter(|| black_box(fingerprinter.fingerprint(black_box(&get))));
    });
    group.bench_function("post_with_body", |b| {
        b.iter(|| black_box(fingerprinter.fingerprint(black_box(&post))));
    });
    group.finish();
}

fn bench_memory_store(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = MemoryStore::with_defaults();
    let fingerprinter = Fingerprinter::default();
    let records: Vec<CacheRecord> = (0..100).map(|i| record(i, &fingerprinter)).collect();

    rt.block_on(async {
        for r in &records {
            store.put(r.clone()).await.unwrap();
        }
    });

    let mut group = c.benchmark_group("memory_store");
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_1kb", |b| {
        let r = records[0].clone();
        b.iter(|| {
            rt.block_on(async {
                store.put(black_box(r.clone())).await.unwrap();
            });
        });
    });

    group.bench_function("get_hit", |b| {
        let key = records[7].fingerprint.clone();
        b.iter(|| {
            rt.block_on(async {
                black_box(store.get(black_box(&key)).await.unwrap());
            });
        });
    });

    group.finish();
}

fn bench_client_hit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = rt.block_on(async {
        let client = Client::builder()
            .config(ClientConfig {
                ttl_seconds: Some(3600),
                ..Default::default()
            })
            .store(MemoryStore::with_defaults())
            .transport(StaticTransport)
            .build()
            .await
            .unwrap();
        client
            .get("https://api.example.com/patents/US1")
            .await
            .unwrap();
        client
    });

    let mut group = c.benchmark_group("client");
    group.throughput(Throughput::Elements(1));
    group.bench_function("fetch_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let response = client
                    .get(black_box("https://api.example.com/patents/US1"))
                    .await
                    .unwrap();
                black_box(response);
            });
        });
    });
    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_memory_store, bench_client_hit);
criterion_main!(benches);
