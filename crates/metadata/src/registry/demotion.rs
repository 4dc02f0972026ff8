//! Per-provider demotion after repeated rate limiting.
//!
//! A provider that keeps answering 429 is not removed from the chain; it
//! is moved behind every active provider for a recovery window, so the
//! resolver reaches for it only when nothing else can supply a field.
//!
//! - **Active**: consulted in configured order.
//! - **Demoted**: consulted after all active providers until the window ends.
//!
//! State is in-memory and resets on restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::models::ProviderId;

const DEFAULT_PENALTY_THRESHOLD: u32 = 2;
const DEFAULT_DEMOTION_SECS: u64 = 300;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStanding {
    Active,
    Demoted,
}

impl std::fmt::Display for ProviderStanding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Demoted => write!(f, "Demoted"),
        }
    }
}

#[derive(Debug, Default)]
struct Standing {
    /// Consecutive rate-limited responses.
    penalties: u32,
    demoted_until: Option<Instant>,
}

/// Demotion configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemotionConfig {
    /// Consecutive rate-limited responses before demotion.
    pub penalty_threshold: u32,
    /// How long a demotion lasts.
    pub demotion_secs: u64,
}

impl Default for DemotionConfig {
    fn default() -> Self {
        Self {
            penalty_threshold: DEFAULT_PENALTY_THRESHOLD,
            demotion_secs: DEFAULT_DEMOTION_SECS,
        }
    }
}

impl DemotionConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.demotion_secs)
    }
}

/// Thread-safe tracker of provider standings.
pub struct DemotionTracker {
    standings: Mutex<HashMap<String, Standing>>,
    config: DemotionConfig,
}

impl DemotionTracker {
    pub fn new() -> Self {
        Self::with_config(DemotionConfig::default())
    }

    pub fn with_config(config: DemotionConfig) -> Self {
        Self {
            standings: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Lock the standings mutex, recovering from poison if necessary.
    fn lock_standings(&self) -> MutexGuard<'_, HashMap<String, Standing>> {
        self.standings.lock().unwrap_or_else(|poisoned| {
            warn!("Demotion tracker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Current standing; an expired demotion flips back to Active here.
    pub fn standing(&self, provider: &ProviderId) -> ProviderStanding {
        let mut standings = self.lock_standings();
        let Some(standing) = standings.get_mut(provider.as_ref()) else {
            return ProviderStanding::Active;
        };

        match standing.demoted_until {
            Some(until) if Instant::now() < until => ProviderStanding::Demoted,
            Some(_) => {
                info!("Demotion: '{}' recovery window over, active again", provider);
                *standing = Standing::default();
                ProviderStanding::Active
            }
            None => ProviderStanding::Active,
        }
    }

    pub fn is_demoted(&self, provider: &ProviderId) -> bool {
        self.standing(provider) == ProviderStanding::Demoted
    }

    /// Count a rate-limited response. Returns true when this response
    /// demoted the provider.
    pub fn record_rate_limited(&self, provider: &ProviderId) -> bool {
        let mut standings = self.lock_standings();
        let standing = standings.entry(provider.to_string()).or_default();
        standing.penalties += 1;

        let already_demoted = standing
            .demoted_until
            .is_some_and(|until| Instant::now() < until);
        if already_demoted || standing.penalties < self.config.penalty_threshold {
            debug!(
                "Demotion: '{}' rate limited ({}/{})",
                provider, standing.penalties, self.config.penalty_threshold
            );
            return false;
        }

        warn!(
            "Demotion: '{}' rate limited {} times, demoted for {:?}",
            provider,
            standing.penalties,
            self.config.window()
        );
        standing.demoted_until = Some(Instant::now() + self.config.window());
        true
    }

    /// Any non-429 answer clears the penalty count. An active demotion
    /// still runs to the end of its window.
    pub fn record_success(&self, provider: &ProviderId) {
        let mut standings = self.lock_standings();
        if let Some(standing) = standings.get_mut(provider.as_ref()) {
            standing.penalties = 0;
        }
    }

    pub fn reset(&self, provider: &ProviderId) {
        self.lock_standings().remove(provider.as_ref());
    }
}

impl Default for DemotionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_unknown_provider_is_active() {
        let tracker = DemotionTracker::new();
        let provider: ProviderId = Cow::Borrowed("NEW");
        assert_eq!(tracker.standing(&provider), ProviderStanding::Active);
    }

    #[test]
    fn test_success_resets_penalties() {
        let tracker = DemotionTracker::new();
        let provider: ProviderId = Cow::Borrowed("FLAKY");

        assert!(!tracker.record_rate_limited(&provider));
        tracker.record_success(&provider);
        assert!(!tracker.record_rate_limited(&provider));
        assert!(!tracker.is_demoted(&provider));
    }

    #[tokio::test(start_paused = true)]
    async fn test_demotion_expires_after_window() {
        let tracker = DemotionTracker::with_config(DemotionConfig {
            penalty_threshold: 2,
            demotion_secs: 60,
        });
        let provider: ProviderId = Cow::Borrowed("BUSY");

        assert!(!tracker.record_rate_limited(&provider));
        assert!(tracker.record_rate_limited(&provider));
        assert!(!tracker.record_rate_limited(&provider));
        assert!(tracker.is_demoted(&provider));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(tracker.standing(&provider), ProviderStanding::Active);
        assert!(!tracker.record_rate_limited(&provider));
    }
}
