//! Provider registry for orchestrating metadata providers.
//!
//! The registry owns the configured provider list and wraps every single
//! provider call with the cross-cutting concerns:
//! - rate limiting (FIFO within priority, bounded by the caller's deadline)
//! - the deadline itself for the call in flight
//! - demotion bookkeeping on 429s
//! - cover URL validation of whatever comes back
//!
//! Which provider to call, and what to do with the answer, is the
//! resolver's business.

use std::borrow::Cow;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::time::Instant;

use super::{CoverValidator, DemotionTracker, RateLimitConfig, RateLimiter};
use crate::errors::MetadataError;
use crate::models::{Priority, ProviderId, ProviderResult};
use crate::provider::{MetadataProvider, RateLimitOverride};

/// A provider together with its rank in the configured trust order.
#[derive(Clone)]
pub struct RankedProvider {
    /// Position in the configured order; lower wins merge precedence.
    pub rank: usize,
    pub provider: Arc<dyn MetadataProvider>,
    pub demoted: bool,
}

impl RankedProvider {
    pub fn id(&self) -> ProviderId {
        Cow::Borrowed(self.provider.id())
    }
}

/// Provider registry for orchestrating metadata fetching.
pub struct ProviderRegistry {
    /// Providers in configured trust order.
    providers: Vec<Arc<dyn MetadataProvider>>,
    rate_limiter: RateLimiter,
    demotion: DemotionTracker,
    covers: CoverValidator,
}

impl ProviderRegistry {
    /// Create a registry with default limiter and demotion settings.
    pub fn new(providers: Vec<Arc<dyn MetadataProvider>>, covers: CoverValidator) -> Self {
        Self::with_config(providers, RateLimiter::new(), DemotionTracker::new(), covers)
    }

    /// Create a registry with custom configuration.
    ///
    /// Each provider's published rate limit is installed in the limiter.
    pub fn with_config(
        providers: Vec<Arc<dyn MetadataProvider>>,
        rate_limiter: RateLimiter,
        demotion: DemotionTracker,
        covers: CoverValidator,
    ) -> Self {
        for provider in &providers {
            let id: ProviderId = Cow::Borrowed(provider.id());
            rate_limiter.configure(&id, RateLimitConfig::from(&provider.rate_limit()));
        }
        Self {
            providers,
            rate_limiter,
            demotion,
            covers,
        }
    }

    /// Keep only the named providers, in the given order.
    ///
    /// Unknown names are logged and ignored. An empty order keeps the
    /// registration order.
    pub fn with_order(mut self, order: &[String]) -> Self {
        if order.is_empty() {
            return self;
        }

        for name in order {
            if !self.providers.iter().any(|p| p.id() == name.as_str()) {
                warn!("Provider order names unknown provider '{}', ignoring", name);
            }
        }

        let mut ordered = Vec::with_capacity(order.len());
        for name in order {
            if let Some(idx) = self.providers.iter().position(|p| p.id() == name.as_str()) {
                ordered.push(self.providers.swap_remove(idx));
            }
        }
        for dropped in &self.providers {
            info!("Provider '{}' not in configured order, disabled", dropped.id());
        }
        self.providers = ordered;
        self
    }

    /// Apply a configured override on top of a provider's published limit.
    pub fn override_rate_limit(&self, provider_id: &str, limit: &RateLimitOverride) {
        let Some(provider) = self.provider(provider_id) else {
            warn!("Rate limit override for unknown provider '{}'", provider_id);
            return;
        };
        let effective = limit.apply(&provider.rate_limit());
        let id: ProviderId = Cow::Borrowed(provider.id());
        self.rate_limiter.configure(&id, RateLimitConfig::from(&effective));
    }

    pub fn providers(&self) -> &[Arc<dyn MetadataProvider>] {
        &self.providers
    }

    pub fn provider(&self, id: &str) -> Option<&Arc<dyn MetadataProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// Position of a provider in the configured trust order.
    pub fn rank_of(&self, id: &str) -> Option<usize> {
        self.providers.iter().position(|p| p.id() == id)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn demotion(&self) -> &DemotionTracker {
        &self.demotion
    }

    /// Order in which the fallback chain consults providers.
    ///
    /// Active providers in configured order, then demoted ones in
    /// configured order. Ranks are unaffected by demotion.
    pub fn consultation_order(&self) -> Vec<RankedProvider> {
        let (active, demoted): (Vec<_>, Vec<_>) = self
            .providers
            .iter()
            .enumerate()
            .map(|(rank, provider)| RankedProvider {
                rank,
                provider: Arc::clone(provider),
                demoted: self.demotion.is_demoted(&Cow::Borrowed(provider.id())),
            })
            .partition(|p| !p.demoted);

        active.into_iter().chain(demoted).collect()
    }

    /// One rate-limited, deadline-bounded, cover-checked volume call.
    pub async fn fetch_volume(
        &self,
        provider: &dyn MetadataProvider,
        series_name: &str,
        volume: u32,
        priority: Priority,
        deadline: Instant,
    ) -> Result<ProviderResult, MetadataError> {
        let id: ProviderId = Cow::Borrowed(provider.id());
        self.rate_limiter.acquire(&id, priority, deadline).await?;

        let outcome = tokio::time::timeout_at(deadline, provider.fetch_volume(series_name, volume))
            .await
            .unwrap_or_else(|_| {
                Err(MetadataError::DeadlineExceeded {
                    provider: id.to_string(),
                })
            });
        self.record_outcome(&id, outcome.as_ref().err());

        let mut result = outcome?;
        if result.volume != volume {
            debug!(
                "{} answered volume {} for a volume {} request",
                id, result.volume, volume
            );
            result.volume = volume;
        }
        self.sanitize(&mut result, deadline).await;

        if result.fields.is_empty() {
            return Err(MetadataError::NotFound {
                provider: id.to_string(),
            });
        }
        Ok(result)
    }

    /// One rate-limited, deadline-bounded, cover-checked series call.
    ///
    /// Results for volumes that were not asked for are dropped, as are
    /// results left empty once their cover failed validation.
    pub async fn fetch_series(
        &self,
        provider: &dyn MetadataProvider,
        series_name: &str,
        volumes: &[u32],
        priority: Priority,
        deadline: Instant,
    ) -> Result<Vec<ProviderResult>, MetadataError> {
        let id: ProviderId = Cow::Borrowed(provider.id());
        self.rate_limiter.acquire(&id, priority, deadline).await?;

        let outcome =
            tokio::time::timeout_at(deadline, provider.fetch_series(series_name, volumes))
                .await
                .unwrap_or_else(|_| {
                    Err(MetadataError::DeadlineExceeded {
                        provider: id.to_string(),
                    })
                });
        self.record_outcome(&id, outcome.as_ref().err());

        let mut results = Vec::new();
        for mut result in outcome? {
            if !volumes.contains(&result.volume)
                || results.iter().any(|r: &ProviderResult| r.volume == result.volume)
            {
                continue;
            }
            self.sanitize(&mut result, deadline).await;
            if !result.fields.is_empty() {
                results.push(result);
            }
        }
        Ok(results)
    }

    async fn sanitize(&self, result: &mut ProviderResult, deadline: Instant) {
        if let Some(rejection) = self.covers.sanitize(&mut result.fields, deadline).await {
            debug!(
                "{} cover for volume {} dropped: {}",
                result.provider_id, result.volume, rejection
            );
        }
    }

    fn record_outcome(&self, id: &ProviderId, error: Option<&MetadataError>) {
        match error {
            Some(MetadataError::RateLimited { .. }) => {
                self.demotion.record_rate_limited(id);
            }
            None | Some(MetadataError::NotFound { .. }) => self.demotion.record_success(id),
            Some(_) => {}
        }
    }
}
