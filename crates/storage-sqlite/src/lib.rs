//! SQLite cache store for Shelfmark.
//!
//! This crate is the only place Diesel appears. It implements the
//! `CacheStore` trait from `shelfmark-core` and contains:
//! - Connection pooling with per-connection PRAGMAs
//! - Embedded Diesel migrations
//! - A single writer actor that serializes read-merge-write cycles
//!
//! ```text
//!   core (resolver, planner, scheduler)
//!                  │  CacheStore
//!                  ▼
//!        storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod cache;
pub mod db;
pub mod errors;
pub mod schema;

pub use cache::SqliteCacheStore;
pub use db::{
    create_pool, get_connection, get_db_path, init, run_migrations, spawn_writer, DbConnection,
    DbPool, WriteHandle,
};
pub use errors::{IntoCache, StorageError};
