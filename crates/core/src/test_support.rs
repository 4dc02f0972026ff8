//! Scripted providers, a counting store and a stub cover probe shared by
//! the resolver, planner and scheduler tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use shelfmark_metadata::{
    CoverProbe, CoverRejection, CoverValidationConfig, CoverValidator, Field, MetadataError,
    MetadataProvider, ProviderCapabilities, ProviderRegistry, ProviderResult, RateLimit,
    VolumeFields,
};
use tokio::time::Instant;

use crate::alerts::{AlertMonitor, RecordingAlertSink};
use crate::cache::{CacheStore, EntrySummary, InMemoryCacheStore, SeriesWrite};
use crate::catalog::{CacheEntry, SeriesKey, VolumeRecord};
use crate::errors::CacheResult;
use crate::resolver::{Resolver, ResolverCore, ResolverSettings};

#[derive(Clone, Debug)]
pub enum Answer {
    Fields(VolumeFields),
    NotFound,
    Transient,
    Permanent,
    RateLimited,
}

impl Answer {
    fn into_result(self, provider: &'static str, volume: u32) -> Result<ProviderResult, MetadataError> {
        let provider_name = provider.to_string();
        match self {
            Answer::Fields(fields) => Ok(ProviderResult::new(provider, volume, fields)),
            Answer::NotFound => Err(MetadataError::NotFound {
                provider: provider_name,
            }),
            Answer::Transient => Err(MetadataError::Transient {
                provider: provider_name,
                message: "HTTP 503".to_string(),
            }),
            Answer::Permanent => Err(MetadataError::Permanent {
                provider: provider_name,
                message: "HTTP 403".to_string(),
            }),
            Answer::RateLimited => Err(MetadataError::RateLimited {
                provider: provider_name,
                retry_after: None,
            }),
        }
    }
}

/// Provider answering from a per-volume script. The last answer of a
/// script repeats.
pub struct ScriptedProvider {
    id: &'static str,
    fields: &'static [Field],
    series: Option<bool>,
    delay: Duration,
    default: Answer,
    scripts: Mutex<HashMap<u32, VecDeque<Answer>>>,
    calls: AtomicUsize,
    series_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            fields: &Field::ALL,
            series: None,
            delay: Duration::ZERO,
            default: Answer::NotFound,
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            series_calls: AtomicUsize::new(0),
        }
    }

    pub fn answer(self, volume: u32, answer: Answer) -> Self {
        self.script(volume, vec![answer])
    }

    pub fn script(self, volume: u32, answers: Vec<Answer>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(volume, answers.into_iter().collect());
        self
    }

    pub fn otherwise(mut self, answer: Answer) -> Self {
        self.default = answer;
        self
    }

    pub fn supplying(mut self, fields: &'static [Field]) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_series_query(mut self, exhaustive: bool) -> Self {
        self.series = Some(exhaustive);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Per-volume calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn series_calls(&self) -> usize {
        self.series_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.calls() + self.series_calls()
    }

    fn next_answer(&self, volume: u32) -> Answer {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&volume) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or(Answer::NotFound),
            Some(script) => script.front().cloned().unwrap_or(Answer::NotFound),
            None => self.default.clone(),
        }
    }
}

#[async_trait]
impl MetadataProvider for ScriptedProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            fields: self.fields,
            supports_series_query: self.series.is_some(),
            series_query_exhaustive: self.series.unwrap_or(false),
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 6000,
            safety_factor: 1.0,
            burst_capacity: 100,
            daily_quota: None,
        }
    }

    async fn fetch_volume(&self, _series_name: &str, volume: u32) -> Result<ProviderResult, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let mut result = self.next_answer(volume).into_result(self.id, volume)?;
        result.fields.retain(self.fields);
        Ok(result)
    }

    async fn fetch_series(
        &self,
        _series_name: &str,
        volumes: &[u32],
    ) -> Result<Vec<ProviderResult>, MetadataError> {
        if self.series.is_none() {
            return Err(MetadataError::NotSupported {
                operation: "series query".to_string(),
                provider: self.id.to_string(),
            });
        }
        self.series_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let mut results = Vec::new();
        for volume in volumes {
            match self.next_answer(*volume).into_result(self.id, *volume) {
                Ok(mut result) => {
                    result.fields.retain(self.fields);
                    results.push(result);
                }
                Err(MetadataError::NotFound { .. }) => {}
                Err(error) => return Err(error),
            }
        }
        if results.is_empty() {
            return Err(MetadataError::NotFound {
                provider: self.id.to_string(),
            });
        }
        Ok(results)
    }
}

/// In-memory store that counts round trips.
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemoryCacheStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    fn read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStore for CountingStore {
    fn lookup_exact(&self, key: &SeriesKey) -> CacheResult<Option<CacheEntry>> {
        self.read();
        self.inner.lookup_exact(key)
    }

    fn series_names(&self) -> CacheResult<Vec<(SeriesKey, String)>> {
        self.read();
        self.inner.series_names()
    }

    fn batch_get(
        &self,
        key: &SeriesKey,
        volumes: &BTreeSet<u32>,
    ) -> CacheResult<BTreeMap<u32, VolumeRecord>> {
        self.read();
        self.inner.batch_get(key, volumes)
    }

    fn entry_summaries(&self) -> CacheResult<Vec<EntrySummary>> {
        self.read();
        self.inner.entry_summaries()
    }

    async fn upsert(&self, record: VolumeRecord) -> CacheResult<VolumeRecord> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(record).await
    }

    async fn write_series(&self, write: SeriesWrite) -> CacheResult<Vec<VolumeRecord>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_series(write).await
    }
}

/// Accepts every cover except those with "broken" in the URL.
#[derive(Default)]
pub struct StubProbe {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CoverProbe for StubProbe {
    async fn probe(&self, url: &str, _timeout: Duration) -> Result<(), CoverRejection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.contains("broken") {
            Err(CoverRejection::BadStatus(404))
        } else {
            Ok(())
        }
    }
}

pub struct Harness {
    pub store: Arc<CountingStore>,
    pub registry: Arc<ProviderRegistry>,
    pub resolver: Resolver,
    pub alerts: RecordingAlertSink,
}

pub fn harness(providers: &[Arc<ScriptedProvider>], settings: ResolverSettings) -> Harness {
    harness_with_store(providers, settings, Arc::new(CountingStore::new()))
}

pub fn harness_with_store(
    providers: &[Arc<ScriptedProvider>],
    settings: ResolverSettings,
    store: Arc<CountingStore>,
) -> Harness {
    let dyn_providers: Vec<Arc<dyn MetadataProvider>> = providers
        .iter()
        .map(|p| Arc::clone(p) as Arc<dyn MetadataProvider>)
        .collect();
    let covers = CoverValidator::new(Arc::new(StubProbe::default()), CoverValidationConfig::default());
    let registry = Arc::new(ProviderRegistry::new(dyn_providers, covers));

    let alerts = RecordingAlertSink::new();
    let monitor = Arc::new(AlertMonitor::new(
        Arc::new(alerts.clone()),
        providers.iter().map(|p| p.id.to_string()).collect(),
        Duration::from_secs(300),
    ));

    let core = ResolverCore::new(
        Arc::clone(&store) as Arc<dyn CacheStore>,
        Arc::clone(&registry),
        monitor,
        settings,
    );
    Harness {
        store,
        registry,
        resolver: Resolver::new(core),
        alerts,
    }
}

/// All seven fields, tagged with `label`.
pub fn full_fields(label: &str) -> VolumeFields {
    VolumeFields {
        title: Some(format!("{} title", label)),
        isbn: Some("9781421582696".to_string()),
        publisher: Some(format!("{} publisher", label)),
        copyright_year: Some(2016),
        description: Some(format!("{} description", label)),
        cover_url: Some(format!("https://covers.example.com/{}.jpg", label.replace(' ', "_"))),
        msrp: Some(dec!(9.99)),
    }
}

/// All fields except the listed ones.
pub fn fields_without(label: &str, missing: &[Field]) -> VolumeFields {
    let mut fields = full_fields(label);
    for field in missing {
        fields.clear(*field);
    }
    fields
}

pub fn deadline_in(secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(secs)
}

pub fn volumes(list: &[u32]) -> Option<BTreeSet<u32>> {
    Some(list.iter().copied().collect())
}

/// Put a complete record for every listed volume in the store.
pub async fn seed_complete(store: &CountingStore, series: &str, list: &[u32]) {
    let key = SeriesKey::normalize(series);
    let records = list
        .iter()
        .map(|n| {
            let mut record = VolumeRecord::new(key.clone(), *n);
            record.fields = full_fields(&format!("cached {}", n));
            record
        })
        .collect();
    store
        .inner
        .write_series(SeriesWrite::new(key, series, records))
        .await
        .unwrap();
}
