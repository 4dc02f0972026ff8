//! Batch query planner.
//!
//! For every distinct series in a request: one `batch_get`, then one
//! fetch task carrying every volume the cache could not answer. Cache
//! round trips therefore scale with series, not volumes.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use log::debug;
use shelfmark_metadata::Priority;
use tokio::time::Instant;

use super::{SeriesLookup, VolumeSelection};
use crate::cache::FuzzyMatch;
use crate::catalog::{FetchTask, SeriesKey, VolumeRecord};
use crate::errors::{Result, ValidationError};
use crate::resolver::{CacheSnapshot, Resolution, ResolutionStatus, ResolveRequest, Resolver};

pub struct BatchPlanner {
    resolver: Resolver,
    max_volumes_per_request: usize,
}

impl BatchPlanner {
    pub fn new(resolver: Resolver, max_volumes_per_request: usize) -> Self {
        Self {
            resolver,
            max_volumes_per_request,
        }
    }

    fn validate(&self, series_name: &str, selection: &VolumeSelection) -> Result<SeriesKey> {
        let key = SeriesKey::normalize(series_name);
        if key.is_empty() {
            return Err(ValidationError::EmptySeriesName.into());
        }
        if selection.is_empty() {
            return Err(ValidationError::InvalidVolumeSelection(String::new()).into());
        }
        if selection.len() > self.max_volumes_per_request {
            return Err(ValidationError::TooManyVolumes {
                requested: selection.len(),
                limit: self.max_volumes_per_request,
            }
            .into());
        }
        Ok(key)
    }

    /// Look up volumes of one series.
    ///
    /// Only input validation fails; an unreachable cache or failing
    /// providers show up as a degraded or partial resolution.
    pub async fn lookup(
        &self,
        series_name: &str,
        selection: &VolumeSelection,
        priority: Priority,
        deadline: Instant,
    ) -> Result<SeriesLookup> {
        let key = self.validate(series_name, selection)?;
        let core = self.resolver.core();
        let threshold = core.settings().completeness_threshold;

        let snapshot = core.snapshot_from(
            key.as_str(),
            core.store().batch_get(&key, selection.volumes()),
        );
        let degraded = snapshot.degraded;

        let (hits, residual): (BTreeMap<u32, VolumeRecord>, BTreeMap<u32, VolumeRecord>) = snapshot
            .records
            .into_iter()
            .partition(|(_, r)| r.is_complete(threshold));
        let missing: BTreeSet<u32> = selection
            .volumes()
            .iter()
            .filter(|n| !hits.contains_key(n))
            .copied()
            .collect();
        let cache_hits: BTreeSet<u32> = hits.keys().copied().collect();

        if missing.is_empty() {
            debug!("'{}': all {} volumes answered by the cache", key, hits.len());
            return Ok(SeriesLookup {
                series_name: series_name.trim().to_string(),
                key: key.clone(),
                cache_hits,
                resolution: Resolution::from_cache(key, hits, threshold),
            });
        }

        let task = FetchTask::new(series_name, Some(missing), priority);
        debug!(
            "'{}': {} cached, fetch task for {} volumes",
            key,
            hits.len(),
            task.volumes.as_ref().map_or(0, BTreeSet::len)
        );
        let seed = CacheSnapshot {
            records: residual,
            degraded,
        };
        let mut resolution = self
            .resolver
            .resolve(ResolveRequest::from_task(&task, deadline), Some(seed))
            .await;

        resolution.records.extend(hits);
        resolution.status = ResolutionStatus::of(resolution.records.values(), threshold);
        resolution.degraded |= degraded;

        Ok(SeriesLookup {
            series_name: task.series_name,
            key,
            cache_hits,
            resolution,
        })
    }

    /// Look up several series at once. Requests for the same series are
    /// merged first, so each distinct series costs one cache round trip.
    pub async fn lookup_many(
        &self,
        requests: &[(String, VolumeSelection)],
        priority: Priority,
        deadline: Instant,
    ) -> Result<Vec<SeriesLookup>> {
        let mut grouped: BTreeMap<SeriesKey, (String, VolumeSelection)> = BTreeMap::new();
        for (name, selection) in requests {
            let key = SeriesKey::normalize(name);
            grouped
                .entry(key)
                .and_modify(|(_, merged)| merged.union(selection))
                .or_insert_with(|| (name.clone(), selection.clone()));
        }
        for (name, selection) in grouped.values() {
            self.validate(name, selection)?;
        }

        let lookups = grouped
            .values()
            .map(|(name, selection)| self.lookup(name, selection, priority, deadline));
        join_all(lookups).await.into_iter().collect()
    }

    /// Ranked fuzzy candidates for free text.
    pub fn search(&self, query: &str) -> Result<Vec<FuzzyMatch>> {
        if query.trim().is_empty() {
            return Err(ValidationError::EmptySeriesName.into());
        }
        Ok(self.resolver.core().store().lookup_fuzzy(query)?)
    }

    /// The cached series a free-text name most likely refers to.
    pub fn resolve_name(&self, query: &str) -> Result<Option<FuzzyMatch>> {
        Ok(self.search(query)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverSettings;
    use crate::test_support::*;
    use shelfmark_metadata::Field;

    fn planner(h: &Harness) -> BatchPlanner {
        BatchPlanner::new(h.resolver.clone(), 200)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_cache_round_trip_regardless_of_volume_count() {
        for count in [1u32, 5, 40] {
            let a = ScriptedProvider::new("A")
                .otherwise(Answer::Fields(full_fields("A")))
                .shared();
            let h = harness(&[a], ResolverSettings::default());
            seed_complete(&h.store, "Naruto", &[1, 2]).await;

            let selection = VolumeSelection::range(1, count);
            let lookup = planner(&h)
                .lookup("Naruto", &selection, Priority::Interactive, deadline_in(600))
                .await
                .unwrap();

            assert_eq!(h.store.reads(), 1, "{} volumes", count);
            assert_eq!(lookup.resolution.records.len(), count as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hits_skip_resolver() {
        let a = ScriptedProvider::new("A").shared();
        let h = harness(&[a.clone()], ResolverSettings::default());
        seed_complete(&h.store, "One Piece", &[1, 2, 3]).await;

        let lookup = planner(&h)
            .lookup(
                "ONE PIECE",
                &"1-3".parse().unwrap(),
                Priority::Interactive,
                deadline_in(30),
            )
            .await
            .unwrap();

        assert_eq!(lookup.cache_hits, BTreeSet::from([1, 2, 3]));
        assert_eq!(lookup.resolution.status, ResolutionStatus::Complete);
        assert_eq!(a.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_residual_goes_to_one_series_call() {
        let a = ScriptedProvider::new("A")
            .with_series_query(true)
            .otherwise(Answer::Fields(full_fields("A")))
            .shared();
        let h = harness(&[a.clone()], ResolverSettings::default());
        seed_complete(&h.store, "Bleach", &[1]).await;

        let lookup = planner(&h)
            .lookup(
                "Bleach",
                &"1-4".parse().unwrap(),
                Priority::Interactive,
                deadline_in(30),
            )
            .await
            .unwrap();

        assert_eq!(a.series_calls(), 1);
        assert_eq!(a.calls(), 0);
        assert_eq!(lookup.cache_hits, BTreeSet::from([1]));
        assert_eq!(lookup.resolution.status, ResolutionStatus::Complete);
        assert_eq!(lookup.resolution.records.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_many_groups_by_series() {
        let a = ScriptedProvider::new("A")
            .otherwise(Answer::Fields(fields_without("A", &[Field::Msrp])))
            .shared();
        let h = harness(&[a], ResolverSettings::default());

        let lookups = planner(&h)
            .lookup_many(
                &[
                    ("Naruto".to_string(), "1-2".parse().unwrap()),
                    ("naruto".to_string(), "3".parse().unwrap()),
                    ("Bleach".to_string(), "1".parse().unwrap()),
                ],
                Priority::Interactive,
                deadline_in(60),
            )
            .await
            .unwrap();

        assert_eq!(lookups.len(), 2);
        assert_eq!(h.store.reads(), 2);
        let naruto = lookups.iter().find(|l| l.key.as_str() == "naruto").unwrap();
        assert_eq!(naruto.resolution.records.len(), 3);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let h = harness(&[], ResolverSettings::default());
        let planner = BatchPlanner::new(h.resolver.clone(), 10);

        let err = planner
            .lookup("  ", &"1".parse().unwrap(), Priority::Interactive, deadline_in(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Validation(ValidationError::EmptySeriesName)
        ));

        let err = planner
            .lookup("Naruto", &"1-11".parse().unwrap(), Priority::Interactive, deadline_in(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Validation(ValidationError::TooManyVolumes { requested: 11, limit: 10 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_finds_partial_name() {
        let h = harness(&[], ResolverSettings::default());
        seed_complete(&h.store, "My Hero Academia: Vigilantes", &[1]).await;
        seed_complete(&h.store, "My Hero Academia", &[1]).await;

        let top = planner(&h).resolve_name("Vigilantes").unwrap().unwrap();
        assert_eq!(top.display_name, "My Hero Academia: Vigilantes");
        assert!(planner(&h).search("   ").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_cache_still_resolves() {
        let a = ScriptedProvider::new("A")
            .otherwise(Answer::Fields(full_fields("A")))
            .shared();
        let h = harness(&[a.clone()], ResolverSettings::default());
        h.store.inner.set_unavailable(true);

        let lookup = planner(&h)
            .lookup("Naruto", &"1-2".parse().unwrap(), Priority::Interactive, deadline_in(30))
            .await
            .unwrap();

        assert!(lookup.resolution.degraded);
        assert_eq!(lookup.resolution.status, ResolutionStatus::Complete);
        assert_eq!(a.calls(), 2);
    }
}
