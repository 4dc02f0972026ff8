//! Catalog domain models.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelfmark_metadata::{Field, Priority, ProviderResult, VolumeFields};

/// Normalized (case-folded, whitespace-collapsed) series identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesKey(String);

impl SeriesKey {
    pub fn normalize(series_name: &str) -> Self {
        let collapsed = series_name.split_whitespace().collect::<Vec<_>>().join(" ");
        Self(collapsed.to_lowercase())
    }

    /// Wrap a key that was normalized before it was stored.
    pub fn from_normalized(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SeriesKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where a field value came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Provider id that supplied the value.
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// One volume's merged metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRecord {
    pub series_key: SeriesKey,
    pub volume_number: u32,
    pub fields: VolumeFields,
    pub provenance: BTreeMap<Field, Provenance>,
    /// Provider chains walked to the end with fields still missing.
    pub lookup_attempts: u32,
    /// Fields confirmed absent from every provider.
    pub unavailable: BTreeSet<Field>,
    pub updated_at: DateTime<Utc>,
}

impl VolumeRecord {
    pub fn new(series_key: SeriesKey, volume_number: u32) -> Self {
        Self {
            series_key,
            volume_number,
            fields: VolumeFields::default(),
            provenance: BTreeMap::new(),
            lookup_attempts: 0,
            unavailable: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }

    /// Fraction of recognised fields that hold a value.
    pub fn completeness(&self) -> f64 {
        self.fields.filled_count() as f64 / Field::COUNT as f64
    }

    /// Completeness counting confirmed-absent fields as settled.
    pub fn effective_completeness(&self) -> f64 {
        let settled = Field::ALL
            .iter()
            .filter(|f| self.fields.has(**f) || self.unavailable.contains(f))
            .count();
        settled as f64 / Field::COUNT as f64
    }

    pub fn is_complete(&self, threshold: f64) -> bool {
        self.effective_completeness() + f64::EPSILON >= threshold
    }

    /// Fields still worth asking a provider for.
    pub fn missing_fields(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| !self.fields.has(*f) && !self.unavailable.contains(f))
            .collect()
    }

    pub fn has_data(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Fill null fields from a provider result. Returns the fields taken.
    pub fn apply_provider(&mut self, result: &ProviderResult) -> Vec<Field> {
        let mut taken = Vec::new();
        for field in Field::ALL {
            if self.fields.fill_from(&result.fields, field) {
                self.provenance.insert(
                    field,
                    Provenance {
                        source: result.provider_id.to_string(),
                        fetched_at: result.fetched_at,
                    },
                );
                self.unavailable.remove(&field);
                taken.push(field);
            }
        }
        taken
    }

    /// Merge another copy of this volume into this one.
    ///
    /// Present values are kept; nulls are filled from `other` together with
    /// their provenance. Never turns a value into null. Returns whether
    /// anything changed.
    pub fn merge_from(&mut self, other: &VolumeRecord) -> bool {
        let mut changed = false;
        for field in Field::ALL {
            if self.fields.fill_from(&other.fields, field) {
                if let Some(provenance) = other.provenance.get(&field) {
                    self.provenance.insert(field, provenance.clone());
                }
                changed = true;
            }
        }

        if other.lookup_attempts > self.lookup_attempts {
            self.lookup_attempts = other.lookup_attempts;
            changed = true;
        }

        let before = self.unavailable.len();
        self.unavailable.extend(other.unavailable.iter().copied());
        changed |= self.unavailable.len() != before;
        let fields = &self.fields;
        self.unavailable.retain(|f| !fields.has(*f));

        changed
    }

    /// Count one exhausted provider chain; past `max_attempts`, mark what is
    /// still missing as unavailable.
    pub fn record_exhausted_lookup(&mut self, max_attempts: Option<u32>) {
        if self.missing_fields().is_empty() {
            return;
        }
        self.lookup_attempts = self.lookup_attempts.saturating_add(1);
        if let Some(max) = max_attempts {
            if self.lookup_attempts >= max {
                let missing = self.missing_fields();
                self.unavailable.extend(missing);
            }
        }
    }
}

/// Every cached volume of one series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: SeriesKey,
    /// Name as first requested, before normalization.
    pub display_name: String,
    pub volumes: BTreeMap<u32, VolumeRecord>,
    pub last_updated: DateTime<Utc>,
    pub last_attempted: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Mean completeness over cached volumes; 0 when there are none.
    pub fn completeness(&self) -> f64 {
        mean(self.volumes.values().map(VolumeRecord::completeness))
    }

    pub fn effective_completeness(&self) -> f64 {
        mean(self.volumes.values().map(VolumeRecord::effective_completeness))
    }

    pub fn volume(&self, number: u32) -> Option<&VolumeRecord> {
        self.volumes.get(&number)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// A unit of resolution work for one series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTask {
    pub key: SeriesKey,
    pub series_name: String,
    /// Volumes to resolve; `None` means every volume already cached.
    pub volumes: Option<BTreeSet<u32>>,
    pub priority: Priority,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl FetchTask {
    pub fn new(series_name: &str, volumes: Option<BTreeSet<u32>>, priority: Priority) -> Self {
        Self {
            key: SeriesKey::normalize(series_name),
            series_name: series_name.trim().to_string(),
            volumes,
            priority,
            attempts: 0,
            last_error: None,
        }
    }

    /// Count a failed run. Attempts only grow, and never past `cap`.
    pub fn record_failure(&mut self, error: impl Into<String>, cap: u32) {
        self.attempts = (self.attempts + 1).min(cap.max(1));
        self.last_error = Some(error.into());
    }

    pub fn attempts_exhausted(&self, cap: u32) -> bool {
        self.attempts >= cap.max(1)
    }
}
