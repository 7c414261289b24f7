//! ipfetch: caching, coalescing, retrying HTTP client for patent-data connectors
//!
//! # Features
//!
//! - **Durable response cache** (SQLite, with an in-memory fallback)
//! - **Request coalescing**: one outbound call per fingerprint at a time
//! - **Retry with backoff** honoring `Retry-After`
//! - **Conditional revalidation** via `ETag` / `Last-Modified`
//! - **Metrics integration**
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ipfetch::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig {
//!         ttl_seconds: Some(3600),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//!     let response = client
//!         .fetch(Request::get("https://api.patentsview.org/patents/query").query("q", "{}"))
//!         .await?;
//!     println!("{} bytes, {:?}", response.body.len(), response.cache_status);
//!
//!     let report = client.cache_stats().await.report();
//!     println!("hit rate {:.2}", report.hit_rate);
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod control;
mod transport;

// Re-export core
pub use ipfetch_core::*;

// Re-export HTTP semantics
pub use ipfetch_http::{
    CacheControl, CacheStatus, ExpiryPolicy, Fingerprinter, PreparedRequest, Request, Response,
    ResponseDirectives, RetryPolicy, TransportResponse,
};

// Re-export storage
pub use ipfetch_storage::{MemoryConfig, MemoryStore};
#[cfg(feature = "sqlite")]
pub use ipfetch_storage::{SqliteConfig, SqliteStore};

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ConfigError, DEFAULT_ACCEPT_LANGUAGE, DEFAULT_USER_AGENT, RetryConfig};
pub use control::{
    CONTROL_OPERATIONS, ControlCommand, ControlError, ControlOperation, ControlOutput,
    OperationKind, find_operation,
};
pub use transport::{ReqwestTransport, Transport};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CacheStats, CacheStatus, Client, ClientConfig, ControlCommand, FetchError, Request,
        Response, RetryConfig,
    };
}
