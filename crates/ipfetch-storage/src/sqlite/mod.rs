//! SQLite cache store

mod migrations;
mod store;

pub use store::{SqliteConfig, SqliteStore};
