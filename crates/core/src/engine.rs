//! Engine wiring: one place that turns an [`EngineConfig`] and a cache
//! store into a ready resolver, planner and scheduler.

use std::sync::Arc;

use log::info;
use shelfmark_metadata::{
    CoverProbe, CoverValidator, DemotionTracker, GoogleBooksProvider, JikanProvider,
    MangaDexProvider, MetadataProvider, MsrpEstimateProvider, Priority, ProviderRegistry,
    RateLimiter, WikipediaProvider,
};
use tokio::time::Instant;

use crate::alerts::{AlertMonitor, AlertSink};
use crate::cache::{CacheStore, FuzzyMatch};
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::planner::{BatchPlanner, SeriesLookup, VolumeSelection};
use crate::resolver::{Resolver, ResolverCore, ResolverSettings};
use crate::scheduler::{CacheScheduler, SchedulerHandle};

/// Every built-in provider. Which ones run, and in what order, is decided
/// by `provider_order`.
pub fn default_providers(
    google_api_key: Option<String>,
    user_agent: &str,
) -> Vec<Arc<dyn MetadataProvider>> {
    vec![
        Arc::new(GoogleBooksProvider::new(google_api_key)),
        Arc::new(MangaDexProvider::new()),
        Arc::new(JikanProvider::new()),
        Arc::new(WikipediaProvider::new(user_agent)),
        Arc::new(MsrpEstimateProvider::new()),
    ]
}

pub struct Engine {
    config: EngineConfig,
    registry: Arc<ProviderRegistry>,
    alerts: Arc<AlertMonitor>,
    resolver: Resolver,
    planner: BatchPlanner,
    scheduler: Arc<CacheScheduler>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn CacheStore>,
        providers: Vec<Arc<dyn MetadataProvider>>,
        probe: Arc<dyn CoverProbe>,
        sink: Arc<dyn AlertSink>,
    ) -> Result<Self> {
        config.validate()?;

        let limiter =
            RateLimiter::new().with_background_max_wait(config.scheduler.background_max_wait());
        let registry = ProviderRegistry::with_config(
            providers,
            limiter,
            DemotionTracker::with_config(config.demotion.clone()),
            CoverValidator::new(probe, config.covers.clone()),
        )
        .with_order(&config.provider_order);
        for (provider_id, limit) in &config.rate_limits {
            registry.override_rate_limit(provider_id, limit);
        }
        let registry = Arc::new(registry);

        let provider_ids: Vec<String> = registry
            .providers()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        info!("Metadata providers in trust order: {}", provider_ids.join(", "));

        let alerts = Arc::new(AlertMonitor::new(
            sink,
            provider_ids,
            config.alerts.cache_outage(),
        ));
        let settings = ResolverSettings {
            retry: config.retry.clone(),
            completeness_threshold: config.completeness_threshold,
            max_lookup_attempts: config.max_lookup_attempts,
        };
        let resolver = Resolver::new(ResolverCore::new(
            store,
            Arc::clone(&registry),
            Arc::clone(&alerts),
            settings,
        ));
        let planner = BatchPlanner::new(resolver.clone(), config.max_volumes_per_request);
        let scheduler = Arc::new(CacheScheduler::new(
            resolver.clone(),
            config.scheduler.clone(),
            config.completeness_threshold,
        ));

        Ok(Self {
            config,
            registry,
            alerts,
            resolver,
            planner,
            scheduler,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn planner(&self) -> &BatchPlanner {
        &self.planner
    }

    pub fn scheduler(&self) -> &Arc<CacheScheduler> {
        &self.scheduler
    }

    /// The cache has been failing since the last successful operation.
    pub fn cache_degraded(&self) -> bool {
        self.alerts.cache_degraded()
    }

    /// Interactive lookup with the configured request deadline.
    pub async fn lookup(&self, series_name: &str, selection: &VolumeSelection) -> Result<SeriesLookup> {
        let deadline = Instant::now() + self.config.request_deadline();
        self.planner
            .lookup(series_name, selection, Priority::Interactive, deadline)
            .await
    }

    pub fn search(&self, query: &str) -> Result<Vec<FuzzyMatch>> {
        self.planner.search(query)
    }

    /// Start the background scheduler, unless disabled in configuration.
    pub fn spawn_scheduler(&self) -> Option<SchedulerHandle> {
        if !self.config.scheduler.enabled {
            info!("Cache scheduler disabled");
            return None;
        }
        Some(Arc::clone(&self.scheduler).spawn())
    }
}
