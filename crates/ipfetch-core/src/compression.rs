//! Body compression for durable stores
//!
//! Bodies are compressed with zstd when the `compression` feature is enabled
//! and the body is large enough to be worth it.

use serde::{Deserialize, Serialize};

use crate::CacheError;

/// Compression level (1-22, higher = better compression but slower)
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Bodies smaller than this are stored as-is
pub const MIN_COMPRESSION_SIZE: usize = 256;

/// How a store encodes response bodies at rest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyCompression {
    /// Store bodies verbatim
    #[default]
    None,
    /// zstd at the given level
    Zstd { level: i32 },
}

impl BodyCompression {
    /// zstd at the default level
    pub fn zstd() -> Self {
        BodyCompression::Zstd {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            BodyCompression::None => "none",
            BodyCompression::Zstd { .. } => "zstd",
        }
    }

    /// Encode a body for storage
    ///
    /// Returns the stored bytes and whether they were compressed. Small bodies
    /// and the `None` mode pass through untouched.
    pub fn encode(&self, body: &[u8]) -> Result<(Vec<u8>, bool), CacheError> {
        match self {
            BodyCompression::None => Ok((body.to_vec(), false)),
            BodyCompression::Zstd { .. } if body.len() < MIN_COMPRESSION_SIZE => {
                Ok((body.to_vec(), false))
            }
            BodyCompression::Zstd { level } => compress(body, *level).map(|out| (out, true)),
        }
    }

    /// Decode stored bytes
    ///
    /// `compressed` is the flag written alongside the bytes, so records written
    /// under a different mode still decode.
    pub fn decode(data: &[u8], compressed: bool) -> Result<Vec<u8>, CacheError> {
        if compressed {
            decompress(data)
        } else {
            Ok(data.to_vec())
        }
    }
}

#[cfg(feature = "compression")]
fn compress(data: &[u8], level: i32) -> Result<Vec<u8>, CacheError> {
    zstd::encode_all(data, level.clamp(1, 22)).map_err(|e| CacheError::Compression(e.to_string()))
}

#[cfg(not(feature = "compression"))]
fn compress(_data: &[u8], _level: i32) -> Result<Vec<u8>, CacheError> {
    Err(CacheError::Compression(
        "zstd support not compiled in (enable the `compression` feature)".to_string(),
    ))
}

#[cfg(feature = "compression")]
fn decompress(data: &[u8]) -> Result<Vec<u8>, CacheError> {
    zstd::decode_all(data).map_err(|e| CacheError::Decompression(e.to_string()))
}

#[cfg(not(feature = "compression"))]
fn decompress(_data: &[u8]) -> Result<Vec<u8>, CacheError> {
    Err(CacheError::Decompression(
        "record is zstd-compressed but the `compression` feature is disabled".to_string(),
    ))
}
