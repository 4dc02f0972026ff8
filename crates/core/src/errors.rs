//! Core error types for the Shelfmark engine.
//!
//! This module defines storage-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use shelfmark_metadata::MetadataError;
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result of a cache store operation.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Root error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Cache operation failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Metadata provider failed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),
}

/// Storage-agnostic error type for cache operations.
///
/// Uses `String` for all details so the storage layer can convert its own
/// errors into this format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The store cannot be reached at all (pool exhausted, file missing,
    /// writer gone). Callers switch to degraded mode.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A query failed to execute.
    #[error("Cache query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be decoded.
    #[error("Corrupt cache row: {0}")]
    Corrupt(String),

    /// Internal/unexpected error.
    #[error("Internal cache error: {0}")]
    Internal(String),
}

impl CacheError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::Unavailable(_))
    }
}

/// Validation errors for caller input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Series name is empty")]
    EmptySeriesName,

    #[error("Invalid volume selection '{0}'")]
    InvalidVolumeSelection(String),

    #[error("Too many volumes requested ({requested}, limit {limit})")]
    TooManyVolumes { requested: usize, limit: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error means the cache could not be reached.
    pub fn is_cache_unavailable(&self) -> bool {
        matches!(self, Error::Cache(e) if e.is_unavailable())
    }
}
