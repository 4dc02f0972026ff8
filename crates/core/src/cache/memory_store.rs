//! In-memory cache store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use log::warn;

use super::{CacheStore, EntrySummary, SeriesWrite};
use crate::catalog::{CacheEntry, SeriesKey, VolumeRecord};
use crate::errors::{CacheError, CacheResult};

/// Process-local store. Used by tests and by hosts that run without a
/// database file.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<SeriesKey, CacheEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `CacheError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn check(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SeriesKey, CacheEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("In-memory cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SeriesKey, CacheEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("In-memory cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn lookup_exact(&self, key: &SeriesKey) -> CacheResult<Option<CacheEntry>> {
        self.check()?;
        Ok(self.read().get(key).cloned())
    }

    fn series_names(&self) -> CacheResult<Vec<(SeriesKey, String)>> {
        self.check()?;
        Ok(self
            .read()
            .values()
            .map(|e| (e.key.clone(), e.display_name.clone()))
            .collect())
    }

    fn batch_get(
        &self,
        key: &SeriesKey,
        volumes: &BTreeSet<u32>,
    ) -> CacheResult<BTreeMap<u32, VolumeRecord>> {
        self.check()?;
        let entries = self.read();
        let Some(entry) = entries.get(key) else {
            return Ok(BTreeMap::new());
        };
        Ok(volumes
            .iter()
            .filter_map(|n| entry.volumes.get(n).map(|r| (*n, r.clone())))
            .collect())
    }

    fn entry_summaries(&self) -> CacheResult<Vec<EntrySummary>> {
        self.check()?;
        Ok(self.read().values().map(EntrySummary::from).collect())
    }

    async fn upsert(&self, record: VolumeRecord) -> CacheResult<VolumeRecord> {
        let key = record.series_key.clone();
        let display_name = key.to_string();
        let write = SeriesWrite::new(key, display_name, vec![record]);
        let mut merged = self.write_series(write).await?;
        merged
            .pop()
            .ok_or_else(|| CacheError::Internal("upsert stored nothing".to_string()))
    }

    async fn write_series(&self, write: SeriesWrite) -> CacheResult<Vec<VolumeRecord>> {
        self.check()?;
        let mut entries = self.write();
        let entry = entries
            .entry(write.key.clone())
            .or_insert_with(|| write.empty_entry());
        Ok(write.apply_to(entry))
    }
}
