//! ipfetch-storage: Cache store backends for ipfetch
//!
//! `MemoryStore` keeps records for the life of the process; `SqliteStore`
//! persists them in a single database file that survives restarts.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub use memory::{MemoryConfig, MemoryStore};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConfig, SqliteStore};
