//! Cache store read and write shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{CacheEntry, SeriesKey, VolumeRecord};

/// One fuzzy lookup candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuzzyMatch {
    pub key: SeriesKey,
    pub display_name: String,
    /// Key equals the normalized query.
    pub exact: bool,
    /// Absolute difference between key and query lengths.
    pub length_difference: usize,
}

/// Scheduler view of one cache entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub key: SeriesKey,
    pub display_name: String,
    pub volume_count: usize,
    pub completeness: f64,
    /// Completeness with confirmed-absent fields counted as settled.
    pub effective_completeness: f64,
    pub last_updated: DateTime<Utc>,
    pub last_attempted: Option<DateTime<Utc>>,
}

impl From<&CacheEntry> for EntrySummary {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            display_name: entry.display_name.clone(),
            volume_count: entry.volumes.len(),
            completeness: entry.completeness(),
            effective_completeness: entry.effective_completeness(),
            last_updated: entry.last_updated,
            last_attempted: entry.last_attempted,
        }
    }
}

/// The write-back of one resolution: every record it touched.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesWrite {
    pub key: SeriesKey,
    pub display_name: String,
    pub records: Vec<VolumeRecord>,
    pub attempted_at: DateTime<Utc>,
}

impl SeriesWrite {
    pub fn new(key: SeriesKey, display_name: impl Into<String>, records: Vec<VolumeRecord>) -> Self {
        Self {
            key,
            display_name: display_name.into(),
            records,
            attempted_at: Utc::now(),
        }
    }

    /// An empty entry to apply this write to when the series is new.
    pub fn empty_entry(&self) -> CacheEntry {
        CacheEntry {
            key: self.key.clone(),
            display_name: self.display_name.clone(),
            volumes: BTreeMap::new(),
            last_updated: self.attempted_at,
            last_attempted: None,
        }
    }

    /// Merge the records into `entry` and return the stored results.
    ///
    /// Non-null always wins, so applying two writes in either order yields
    /// the same field values when they do not overlap.
    pub fn apply_to(&self, entry: &mut CacheEntry) -> Vec<VolumeRecord> {
        let now = Utc::now();
        let mut merged = Vec::with_capacity(self.records.len());
        let mut changed = false;

        for record in &self.records {
            let stored = match entry.volumes.get_mut(&record.volume_number) {
                Some(existing) => {
                    if existing.merge_from(record) {
                        existing.updated_at = now;
                        changed = true;
                    }
                    existing.clone()
                }
                None => {
                    let mut fresh = record.clone();
                    fresh.series_key = self.key.clone();
                    fresh.updated_at = now;
                    entry.volumes.insert(fresh.volume_number, fresh.clone());
                    changed = true;
                    fresh
                }
            };
            merged.push(stored);
        }

        if changed {
            entry.last_updated = now;
        }
        entry.last_attempted = Some(
            entry
                .last_attempted
                .map_or(self.attempted_at, |prev| prev.max(self.attempted_at)),
        );
        merged
    }
}
