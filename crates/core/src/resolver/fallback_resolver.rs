//! The per-series fallback resolver.
//!
//! Checks the cache, walks the provider chain for whatever is still
//! missing, merges field by field in trust order and writes the result
//! back. Provider failures never become caller errors: they end up in the
//! diagnostics and the resolution is `Partial` or `NotFound`.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use log::{debug, info, warn};
use shelfmark_metadata::{
    BackoffPolicy, Field, FetchDiagnostics, MetadataError, ProviderRegistry, ProviderResult,
    RankedProvider, RetryClass, SkipReason,
};
use tokio::time::Instant;

use super::resolver_state::StateTrace;
use super::{
    merge_staged, CacheSnapshot, Resolution, ResolutionState, ResolutionStatus, ResolveRequest,
    StagedResults,
};
use crate::alerts::AlertMonitor;
use crate::cache::{CacheStore, SeriesWrite};
use crate::catalog::VolumeRecord;
use crate::errors::CacheError;

/// Knobs the resolver reads from engine configuration.
#[derive(Clone, Debug)]
pub struct ResolverSettings {
    pub retry: BackoffPolicy,
    pub completeness_threshold: f64,
    pub max_lookup_attempts: Option<u32>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            retry: BackoffPolicy::default(),
            completeness_threshold: 1.0,
            max_lookup_attempts: None,
        }
    }
}

/// What one provider produced for this resolution.
#[derive(Default)]
struct Consultation {
    results: Vec<ProviderResult>,
    /// The error that ended the consultation, if any.
    error: Option<MetadataError>,
    calls: u32,
    retries: u32,
}

impl Consultation {
    fn aborted(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.retry_class() == RetryClass::Abort)
    }
}

/// Resolution logic without coalescing. Use [`super::Resolver`].
pub struct ResolverCore {
    store: Arc<dyn CacheStore>,
    registry: Arc<ProviderRegistry>,
    alerts: Arc<AlertMonitor>,
    settings: ResolverSettings,
}

impl ResolverCore {
    pub fn new(
        store: Arc<dyn CacheStore>,
        registry: Arc<ProviderRegistry>,
        alerts: Arc<AlertMonitor>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            store,
            registry,
            alerts,
            settings,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn alerts(&self) -> &Arc<AlertMonitor> {
        &self.alerts
    }

    /// Read the cache for a request, recording the outcome for alerting.
    pub fn read_cache(&self, request: &ResolveRequest) -> CacheSnapshot {
        let outcome = match &request.volumes {
            Some(volumes) => self.store.batch_get(&request.key, volumes),
            None => self
                .store
                .lookup_exact(&request.key)
                .map(|entry| entry.map(|e| e.volumes).unwrap_or_default()),
        };
        self.snapshot_from(&request.key.to_string(), outcome)
    }

    pub(crate) fn snapshot_from(
        &self,
        key: &str,
        outcome: Result<BTreeMap<u32, VolumeRecord>, CacheError>,
    ) -> CacheSnapshot {
        match outcome {
            Ok(records) => {
                self.alerts.record_cache_ok();
                CacheSnapshot {
                    records,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!("Cache read for '{}' failed, resolving without it: {}", key, e);
                self.alerts.record_cache_failure(&e.to_string());
                CacheSnapshot {
                    records: BTreeMap::new(),
                    degraded: true,
                }
            }
        }
    }

    /// Run one resolution. `seed` replaces the cache read when the caller
    /// has already done it.
    pub async fn resolve(&self, request: &ResolveRequest, seed: Option<CacheSnapshot>) -> Resolution {
        let threshold = self.settings.completeness_threshold;
        let mut trace = StateTrace::start();
        trace.enter(ResolutionState::CacheCheck);

        let snapshot = match seed {
            Some(snapshot) => snapshot,
            None => self.read_cache(request),
        };
        let mut degraded = snapshot.degraded;
        let cached: BTreeSet<u32> = snapshot.records.keys().copied().collect();

        let wanted: BTreeSet<u32> = match &request.volumes {
            Some(volumes) => volumes.clone(),
            None => cached.clone(),
        };
        let mut cached_records = snapshot.records;
        let base: BTreeMap<u32, VolumeRecord> = wanted
            .iter()
            .map(|n| {
                let record = cached_records
                    .remove(n)
                    .unwrap_or_else(|| VolumeRecord::new(request.key.clone(), *n));
                (*n, record)
            })
            .collect();

        if !base.is_empty() && base.values().all(|r| r.is_complete(threshold)) {
            debug!("'{}' fully cached, no provider calls", request.key);
            trace.enter(ResolutionState::Done);
            return Resolution {
                key: request.key.clone(),
                status: ResolutionStatus::Complete,
                records: base,
                degraded,
                persisted: false,
                provider_calls: 0,
                provider_failures: 0,
                diagnostics: FetchDiagnostics::new(),
                coalesced: false,
                expired: false,
                trace: trace.into_states(),
            };
        }

        let order = self.registry.consultation_order();
        let mut diagnostics = FetchDiagnostics::new();
        let mut staged: Vec<StagedResults> = Vec::new();
        let mut working = base.clone();
        let mut provider_calls = 0;
        let mut provider_failures = 0;
        let mut expired = false;
        let mut walked_to_end = true;

        for (index, ranked) in order.iter().enumerate() {
            trace.enter(ResolutionState::Provider(index));

            let needed: Vec<u32> = working
                .values()
                .filter(|r| !r.is_complete(threshold))
                .map(|r| r.volume_number)
                .collect();
            if needed.is_empty() {
                walked_to_end = false;
                for rest in &order[index..] {
                    diagnostics.record_skip(rest.id(), SkipReason::AlreadyComplete);
                }
                break;
            }

            if Instant::now() >= request.deadline {
                expired = true;
                walked_to_end = false;
                for rest in &order[index..] {
                    diagnostics.record_skip(rest.id(), SkipReason::DeadlineExpired);
                }
                break;
            }

            let capabilities = ranked.provider.capabilities();
            let useful: Vec<u32> = needed
                .into_iter()
                .filter(|n| {
                    working
                        .get(n)
                        .is_some_and(|r| capabilities.supplies_any(&r.missing_fields()))
                })
                .collect();
            if useful.is_empty() {
                diagnostics.record_skip(ranked.id(), SkipReason::NoUsefulFields);
                continue;
            }

            let consultation = self.consult(ranked, request, &useful).await;
            provider_calls += consultation.calls;
            self.record_provider_health(ranked, &consultation);

            let aborted = consultation.aborted();
            match &consultation.error {
                Some(MetadataError::QuotaExhausted { .. }) if consultation.results.is_empty() => {
                    diagnostics.record_skip(ranked.id(), SkipReason::QuotaExhausted);
                }
                Some(error) if consultation.results.is_empty() => {
                    if !matches!(error, MetadataError::NotFound { .. }) {
                        provider_failures += 1;
                    }
                    diagnostics.record_error(
                        ranked.id(),
                        error.to_string(),
                        consultation.retries,
                        ranked.demoted,
                    );
                }
                _ => diagnostics.record_success(
                    ranked.id(),
                    consultation.retries,
                    ranked.demoted,
                    Vec::new(),
                ),
            }

            if !consultation.results.is_empty() {
                trace.enter(ResolutionState::Merge(index));
                staged.push(StagedResults {
                    rank: ranked.rank,
                    results: consultation.results,
                });
                working = merge_staged(&base, &staged);
            }

            if aborted {
                expired = true;
                walked_to_end = false;
                for rest in &order[index + 1..] {
                    diagnostics.record_skip(rest.id(), SkipReason::DeadlineExpired);
                }
                break;
            }
        }

        attribute_fields(&mut diagnostics, &base, &working);

        if walked_to_end {
            for record in working.values_mut() {
                record.record_exhausted_lookup(self.settings.max_lookup_attempts);
            }
        }

        let mut persisted = false;
        let mut records = working;
        if degraded {
            debug!("'{}' resolved in degraded mode, skipping write-back", request.key);
        } else {
            let writes: Vec<VolumeRecord> = records
                .values()
                .filter(|r| r.has_data() || cached.contains(&r.volume_number))
                .cloned()
                .collect();
            if !writes.is_empty() {
                let write = SeriesWrite::new(request.key.clone(), request.series_name.clone(), writes);
                match self.store.write_series(write).await {
                    Ok(stored) => {
                        self.alerts.record_cache_ok();
                        persisted = true;
                        for record in stored {
                            records.insert(record.volume_number, record);
                        }
                    }
                    Err(e) => {
                        warn!("Write-back for '{}' failed: {}", request.key, e);
                        self.alerts.record_cache_failure(&e.to_string());
                        degraded = true;
                    }
                }
            }
        }

        let status = ResolutionStatus::of(records.values(), threshold);
        trace.enter(if status == ResolutionStatus::Complete {
            ResolutionState::Done
        } else {
            ResolutionState::DonePartial
        });

        info!(
            "Resolved '{}' ({:?}, {} provider calls): {}",
            request.key,
            status,
            provider_calls,
            diagnostics.summary()
        );

        Resolution {
            key: request.key.clone(),
            status,
            records,
            degraded,
            persisted,
            provider_calls,
            provider_failures,
            diagnostics,
            coalesced: false,
            expired,
            trace: trace.into_states(),
        }
    }

    /// Ask one provider for `volumes`: a series query when it has one and
    /// more than one volume is needed, per-volume calls for the rest.
    async fn consult(
        &self,
        ranked: &RankedProvider,
        request: &ResolveRequest,
        volumes: &[u32],
    ) -> Consultation {
        let provider = ranked.provider.as_ref();
        let capabilities = provider.capabilities();
        let mut consultation = Consultation::default();
        let mut residual: Vec<u32> = volumes.to_vec();

        if capabilities.supports_series_query && volumes.len() > 1 {
            let (outcome, calls) = self
                .with_retry(provider.id(), request.deadline, || {
                    self.registry.fetch_series(
                        provider,
                        &request.series_name,
                        volumes,
                        request.priority(),
                        request.deadline,
                    )
                })
                .await;
            consultation.calls += calls;
            consultation.retries += calls.saturating_sub(1);

            match outcome {
                Ok(results) => {
                    residual.retain(|n| !results.iter().any(|r| r.volume == *n));
                    consultation.results = results;
                    if capabilities.series_query_exhaustive {
                        residual.clear();
                    }
                }
                Err(MetadataError::NotFound { .. }) => residual.clear(),
                Err(error) => {
                    consultation.error = Some(error);
                    return consultation;
                }
            }
        }

        for volume in residual {
            let (outcome, calls) = self
                .with_retry(provider.id(), request.deadline, || {
                    self.registry.fetch_volume(
                        provider,
                        &request.series_name,
                        volume,
                        request.priority(),
                        request.deadline,
                    )
                })
                .await;
            consultation.calls += calls;
            consultation.retries += calls.saturating_sub(1);

            match outcome {
                Ok(result) => consultation.results.push(result),
                Err(error) if error.retry_class() == RetryClass::NextProvider => {
                    consultation.error.get_or_insert(error);
                }
                Err(error) => {
                    consultation.error = Some(error);
                    break;
                }
            }
        }

        if consultation.error.is_none() && consultation.results.is_empty() {
            consultation.error = Some(MetadataError::NotFound {
                provider: provider.id().to_string(),
            });
        }
        consultation
    }

    /// Repeat `call` while its error is retryable and attempts and the
    /// deadline allow. Returns the last outcome and the number of calls
    /// that reached the provider.
    async fn with_retry<T, F, Fut>(
        &self,
        provider_id: &str,
        deadline: Instant,
        mut call: F,
    ) -> (Result<T, MetadataError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MetadataError>>,
    {
        let policy = &self.settings.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match call().await {
                Ok(value) => return (Ok(value), attempt),
                Err(error) => error,
            };

            let reached_provider = !matches!(
                error,
                MetadataError::QuotaExhausted { .. } | MetadataError::RateLimitTimeout { .. }
            );
            let calls = if reached_provider { attempt } else { attempt - 1 };

            let class = error.retry_class();
            let retryable = matches!(class, RetryClass::WithBackoff | RetryClass::BackoffWithPenalty);
            if !retryable || !policy.allows_retry(attempt) {
                return (Err(error), calls);
            }

            let delay = policy.delay_for(attempt, class, error.retry_after());
            if Instant::now() + delay >= deadline {
                debug!("{}: no time left to retry after '{}'", provider_id, error);
                return (
                    Err(MetadataError::DeadlineExceeded {
                        provider: provider_id.to_string(),
                    }),
                    calls,
                );
            }
            debug!(
                "{}: attempt {} failed ({}), retrying in {:?}",
                provider_id, attempt, error, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn record_provider_health(&self, ranked: &RankedProvider, consultation: &Consultation) {
        let permanent = consultation.results.is_empty()
            && consultation
                .error
                .as_ref()
                .is_some_and(MetadataError::is_permanent);
        if consultation.calls > 0 || permanent {
            self.alerts.record_provider(ranked.provider.id(), permanent);
        }
    }
}

/// Credit each successful provider with the fields its values hold in the
/// final merge, leaving out what the cache already had.
fn attribute_fields(
    diagnostics: &mut FetchDiagnostics,
    base: &BTreeMap<u32, VolumeRecord>,
    records: &BTreeMap<u32, VolumeRecord>,
) {
    for attempt in diagnostics.attempts.iter_mut().filter(|a| a.success) {
        let mut supplied: BTreeSet<Field> = BTreeSet::new();
        for record in records.values() {
            let before = base.get(&record.volume_number);
            supplied.extend(
                record
                    .provenance
                    .iter()
                    .filter(|(f, p)| {
                        attempt.provider_id == p.source.as_str()
                            && !before.is_some_and(|b| b.fields.has(**f))
                    })
                    .map(|(f, _)| *f),
            );
        }
        attempt.fields_supplied = supplied.into_iter().collect();
    }
}
