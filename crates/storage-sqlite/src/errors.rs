//! Storage-specific error types for SQLite operations.
//!
//! Diesel and r2d2 failures are wrapped here and converted to the
//! database-agnostic `CacheError` before leaving the crate.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use shelfmark_core::errors::{CacheError, CacheResult};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Stored value could not be decoded: {0}")]
    SerializationError(String),

    #[error("Writer unavailable: {0}")]
    WriterUnavailable(String),

    #[error("{0}")]
    Cache(CacheError),
}

/// Lets write jobs return cache errors through the transaction wrapper.
impl From<CacheError> for StorageError {
    fn from(err: CacheError) -> Self {
        StorageError::Cache(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<StorageError> for CacheError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConnectionFailed(e) => CacheError::Unavailable(e.to_string()),
            StorageError::PoolError(e) => CacheError::Unavailable(e.to_string()),
            StorageError::WriterUnavailable(e) => CacheError::Unavailable(e),
            StorageError::QueryFailed(DieselError::DatabaseError(
                DatabaseErrorKind::ClosedConnection,
                info,
            )) => CacheError::Unavailable(info.message().to_string()),
            StorageError::QueryFailed(e) => CacheError::QueryFailed(e.to_string()),
            StorageError::MigrationFailed(e) => CacheError::Unavailable(e),
            StorageError::SerializationError(e) => CacheError::Corrupt(e),
            StorageError::Cache(e) => e,
        }
    }
}

/// Extension trait for converting Diesel and pool results to cache results.
pub trait IntoCache<T> {
    fn into_cache(self) -> CacheResult<T>;
}

impl<T> IntoCache<T> for std::result::Result<T, DieselError> {
    fn into_cache(self) -> CacheResult<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

impl<T> IntoCache<T> for std::result::Result<T, r2d2::Error> {
    fn into_cache(self) -> CacheResult<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

impl<T> IntoCache<T> for std::result::Result<T, StorageError> {
    fn into_cache(self) -> CacheResult<T> {
        self.map_err(CacheError::from)
    }
}
