//! Cache module - the store contract, fuzzy ranking and an in-memory store.
//!
//! The persistent implementation lives in the `storage-sqlite` crate.

mod cache_model;
mod cache_traits;
mod fuzzy;
mod memory_store;

pub use cache_model::{EntrySummary, FuzzyMatch, SeriesWrite};
pub use cache_traits::CacheStore;
pub use fuzzy::rank_candidates;
pub use memory_store::InMemoryCacheStore;
