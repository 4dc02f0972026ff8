//! Engine configuration.
//!
//! Every field has a default, so a partial TOML file or an empty one
//! yields a working engine.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shelfmark_metadata::{BackoffPolicy, CoverValidationConfig, DemotionConfig, RateLimitOverride};

use crate::errors::{Error, Result};
use crate::scheduler::SchedulerConfig;

/// Default trust order: earlier providers win overlapping fields.
pub const DEFAULT_PROVIDER_ORDER: [&str; 5] =
    ["GOOGLE_BOOKS", "MANGADEX", "JIKAN", "WIKIPEDIA", "MSRP_ESTIMATE"];

const DEFAULT_REQUEST_DEADLINE_MS: u64 = 30_000;
const DEFAULT_MAX_VOLUMES_PER_REQUEST: usize = 200;
const DEFAULT_CACHE_OUTAGE_SECS: u64 = 300;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// How long the cache may stay unreachable before an alert is raised.
    pub cache_outage_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cache_outage_secs: DEFAULT_CACHE_OUTAGE_SECS,
        }
    }
}

impl AlertConfig {
    pub fn cache_outage(&self) -> Duration {
        Duration::from_secs(self.cache_outage_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Provider ids in trust order. Providers not listed are disabled.
    pub provider_order: Vec<String>,
    /// Overrides of published limits, keyed by provider id.
    pub rate_limits: BTreeMap<String, RateLimitOverride>,
    pub retry: BackoffPolicy,
    /// Completeness at which a record needs no further lookups.
    pub completeness_threshold: f64,
    /// Exhausted chains after which still-missing fields are marked
    /// unavailable. Unset keeps retrying them forever.
    pub max_lookup_attempts: Option<u32>,
    /// Deadline given to interactive lookups.
    pub request_deadline_ms: u64,
    pub max_volumes_per_request: usize,
    pub scheduler: SchedulerConfig,
    pub covers: CoverValidationConfig,
    pub demotion: DemotionConfig,
    pub alerts: AlertConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_order: DEFAULT_PROVIDER_ORDER.iter().map(|s| s.to_string()).collect(),
            rate_limits: BTreeMap::new(),
            retry: BackoffPolicy::default(),
            completeness_threshold: 1.0,
            max_lookup_attempts: None,
            request_deadline_ms: DEFAULT_REQUEST_DEADLINE_MS,
            max_volumes_per_request: DEFAULT_MAX_VOLUMES_PER_REQUEST,
            scheduler: SchedulerConfig::default(),
            covers: CoverValidationConfig::default(),
            demotion: DemotionConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.completeness_threshold > 0.0 && self.completeness_threshold <= 1.0) {
            return Err(Error::InvalidConfigValue(format!(
                "completeness_threshold must be in (0, 1], got {}",
                self.completeness_threshold
            )));
        }
        if self.max_lookup_attempts == Some(0) {
            return Err(Error::InvalidConfigValue(
                "max_lookup_attempts must be at least 1 when set".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 || self.retry.factor < 1.0 {
            return Err(Error::InvalidConfigValue(
                "retry needs max_attempts >= 1 and factor >= 1".to_string(),
            ));
        }
        if self.request_deadline_ms == 0 || self.max_volumes_per_request == 0 {
            return Err(Error::InvalidConfigValue(
                "request_deadline_ms and max_volumes_per_request must be positive".to_string(),
            ));
        }
        for (provider, limit) in &self.rate_limits {
            if limit.requests_per_minute == Some(0) || limit.burst_capacity == Some(0) {
                return Err(Error::InvalidConfigValue(format!(
                    "rate limit for {} must allow at least one request",
                    provider
                )));
            }
            if matches!(limit.safety_factor, Some(f) if !(f > 0.0 && f <= 1.0)) {
                return Err(Error::InvalidConfigValue(format!(
                    "safety_factor for {} must be in (0, 1]",
                    provider
                )));
            }
        }
        self.scheduler.validate()
    }
}
