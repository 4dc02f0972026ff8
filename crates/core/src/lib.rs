//! Shelfmark Core - catalog model, cache contract and the resolution engine.
//!
//! This crate holds the logic that keeps the metadata cache complete:
//! the fallback resolver, the batch planner and the background scheduler.
//! It is database-agnostic and defines the `CacheStore` trait that the
//! `storage-sqlite` crate implements.

pub mod alerts;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod planner;
pub mod resolver;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use cache::{CacheStore, EntrySummary, FuzzyMatch, InMemoryCacheStore, SeriesWrite};
pub use catalog::{CacheEntry, FetchTask, Provenance, SeriesKey, VolumeRecord};
pub use config::EngineConfig;
pub use engine::{default_providers, Engine};
pub use planner::{SeriesLookup, VolumeSelection};
pub use resolver::{Resolution, ResolutionStatus};

// Re-export error types
pub use errors::{CacheError, CacheResult, Error, Result, ValidationError};
