//! Cache store trait.
//!
//! The store is the only mutable state of the engine. Implementations must
//! make `write_series` safe under concurrent writes to the same key: each
//! write merges field by field, and a present value is never replaced by
//! null.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use super::{rank_candidates, EntrySummary, FuzzyMatch, SeriesWrite};
use crate::catalog::{CacheEntry, SeriesKey, VolumeRecord};
use crate::errors::CacheResult;

/// Trait defining the contract for cache store operations.
///
/// Reads are synchronous, writes are async so that implementations can
/// route them through a single writer.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Entry for an exact normalized key.
    fn lookup_exact(&self, key: &SeriesKey) -> CacheResult<Option<CacheEntry>>;

    /// Every cached key with its display name.
    fn series_names(&self) -> CacheResult<Vec<(SeriesKey, String)>>;

    /// Ranked candidates for free text. The first one is the match used
    /// for resolution; the full list is for disambiguation.
    fn lookup_fuzzy(&self, query: &str) -> CacheResult<Vec<FuzzyMatch>> {
        Ok(rank_candidates(query, self.series_names()?))
    }

    /// The requested volumes of one series in a single round trip.
    ///
    /// Volumes not in the cache are absent from the map.
    fn batch_get(
        &self,
        key: &SeriesKey,
        volumes: &BTreeSet<u32>,
    ) -> CacheResult<BTreeMap<u32, VolumeRecord>>;

    /// Completeness summaries of every entry.
    fn entry_summaries(&self) -> CacheResult<Vec<EntrySummary>>;

    /// Merge one record. Returns the stored record.
    async fn upsert(&self, record: VolumeRecord) -> CacheResult<VolumeRecord>;

    /// Merge every record of one resolution and stamp the attempt time.
    async fn write_series(&self, write: SeriesWrite) -> CacheResult<Vec<VolumeRecord>>;
}
