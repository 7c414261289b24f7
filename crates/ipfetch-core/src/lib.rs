//! ipfetch-core: Core traits and types for the ipfetch request layer
//!
//! This crate provides the cache record model, the storage contract shared by
//! every backend, and the error taxonomy surfaced to connectors.

mod compression;
mod error;
mod traits;
mod types;

pub use compression::{BodyCompression, DEFAULT_COMPRESSION_LEVEL, MIN_COMPRESSION_SIZE};
pub use error::{CacheError, FetchError, Result};
pub use traits::*;
pub use types::*;
