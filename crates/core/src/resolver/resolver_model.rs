//! Resolver request and outcome types.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use shelfmark_metadata::{FetchDiagnostics, Priority};
use tokio::time::Instant;

use super::ResolutionState;
use crate::catalog::{FetchTask, SeriesKey, VolumeRecord};

/// Priority of a running resolution, shared between its clones.
///
/// It can only be raised: once an interactive caller depends on a
/// background resolution, every later token it acquires is interactive.
#[derive(Clone, Debug)]
pub struct SharedPriority(Arc<AtomicBool>);

impl SharedPriority {
    pub fn new(priority: Priority) -> Self {
        Self(Arc::new(AtomicBool::new(priority == Priority::Interactive)))
    }

    pub fn get(&self) -> Priority {
        if self.0.load(Ordering::Acquire) {
            Priority::Interactive
        } else {
            Priority::Background
        }
    }

    pub fn escalate(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// One resolution to run.
#[derive(Clone, Debug)]
pub struct ResolveRequest {
    pub key: SeriesKey,
    /// Name sent to providers.
    pub series_name: String,
    /// `None` resolves every volume already cached for the series.
    pub volumes: Option<BTreeSet<u32>>,
    pub deadline: Instant,
    origin: Priority,
    priority: SharedPriority,
}

impl ResolveRequest {
    pub fn new(
        series_name: &str,
        volumes: Option<BTreeSet<u32>>,
        priority: Priority,
        deadline: Instant,
    ) -> Self {
        Self {
            key: SeriesKey::normalize(series_name),
            series_name: series_name.trim().to_string(),
            volumes,
            deadline,
            origin: priority,
            priority: SharedPriority::new(priority),
        }
    }

    pub fn from_task(task: &FetchTask, deadline: Instant) -> Self {
        Self {
            key: task.key.clone(),
            series_name: task.series_name.clone(),
            volumes: task.volumes.clone(),
            deadline,
            origin: task.priority,
            priority: SharedPriority::new(task.priority),
        }
    }

    /// Priority for the next rate-limiter acquisition.
    pub fn priority(&self) -> Priority {
        self.priority.get()
    }

    /// Priority the caller asked for, before any escalation.
    pub fn origin(&self) -> Priority {
        self.origin
    }

    pub fn shared_priority(&self) -> &SharedPriority {
        &self.priority
    }
}

/// Cache state a caller already read, handed to the resolver so it does
/// not read again.
#[derive(Clone, Debug, Default)]
pub struct CacheSnapshot {
    pub records: BTreeMap<u32, VolumeRecord>,
    /// The read failed; records are empty and nothing will be written.
    pub degraded: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Every requested volume reached the completeness threshold.
    Complete,
    /// Some fields found, some still missing.
    Partial,
    /// Neither the cache nor any provider knew anything.
    NotFound,
}

impl ResolutionStatus {
    pub fn of<'a>(records: impl IntoIterator<Item = &'a VolumeRecord>, threshold: f64) -> Self {
        let mut any_data = false;
        let mut all_complete = true;
        let mut seen = false;
        for record in records {
            seen = true;
            any_data |= record.has_data();
            all_complete &= record.is_complete(threshold);
        }
        if seen && all_complete {
            ResolutionStatus::Complete
        } else if any_data {
            ResolutionStatus::Partial
        } else {
            ResolutionStatus::NotFound
        }
    }
}

/// Outcome of one resolution.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub key: SeriesKey,
    pub status: ResolutionStatus,
    /// One record per requested volume, found or not.
    pub records: BTreeMap<u32, VolumeRecord>,
    /// The cache was unreachable for the read or the write-back.
    pub degraded: bool,
    pub persisted: bool,
    pub provider_calls: u32,
    /// Providers that failed with something other than "not found".
    pub provider_failures: u32,
    pub diagnostics: FetchDiagnostics,
    /// This caller joined another caller's in-flight resolution.
    pub coalesced: bool,
    /// The deadline cut the provider chain short.
    pub expired: bool,
    pub trace: Vec<ResolutionState>,
}

impl Resolution {
    /// A resolution answered entirely from the cache.
    pub fn from_cache(key: SeriesKey, records: BTreeMap<u32, VolumeRecord>, threshold: f64) -> Self {
        Self {
            status: ResolutionStatus::of(records.values(), threshold),
            key,
            records,
            degraded: false,
            persisted: false,
            provider_calls: 0,
            provider_failures: 0,
            diagnostics: FetchDiagnostics::new(),
            coalesced: false,
            expired: false,
            trace: vec![
                ResolutionState::Pending,
                ResolutionState::CacheCheck,
                ResolutionState::Done,
            ],
        }
    }

    /// What a caller gets when its deadline passes while waiting on
    /// someone else's resolution.
    pub fn expired(key: SeriesKey, snapshot: Option<CacheSnapshot>, threshold: f64) -> Self {
        let snapshot = snapshot.unwrap_or_default();
        Self {
            status: ResolutionStatus::of(snapshot.records.values(), threshold),
            key,
            records: snapshot.records,
            degraded: snapshot.degraded,
            persisted: false,
            provider_calls: 0,
            provider_failures: 0,
            diagnostics: FetchDiagnostics::new(),
            coalesced: true,
            expired: true,
            trace: vec![ResolutionState::Pending, ResolutionState::DonePartial],
        }
    }

    /// The part of this resolution covering `volumes`.
    pub fn subset(&self, volumes: Option<&BTreeSet<u32>>, threshold: f64) -> Self {
        let mut subset = self.clone();
        if let Some(volumes) = volumes {
            subset.records.retain(|n, _| volumes.contains(n));
            subset.status = ResolutionStatus::of(subset.records.values(), threshold);
        }
        subset
    }

    pub fn is_complete(&self) -> bool {
        self.status == ResolutionStatus::Complete
    }
}
