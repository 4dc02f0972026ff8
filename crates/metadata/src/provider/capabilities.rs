//! Provider capabilities and rate limiting configuration.
//!
//! This module defines structures for describing what a metadata provider
//! can supply and how hard we are allowed to call it.

use serde::{Deserialize, Serialize};

use crate::models::Field;

/// Safety margin applied to every published limit.
pub const DEFAULT_SAFETY_FACTOR: f64 = 0.9;

/// Describes the capabilities of a metadata provider.
///
/// Used by the resolver to skip providers that cannot contribute any of
/// the fields still missing, and to decide between series-level and
/// per-volume calls.
#[derive(Clone, Debug)]
pub struct ProviderCapabilities {
    /// Fields this provider is able to supply.
    pub fields: &'static [Field],

    /// Whether one call can return data for several volumes of a series.
    pub supports_series_query: bool,

    /// Whether a series-level answer is authoritative for every volume it
    /// omits. When false, omitted volumes get per-volume calls.
    pub series_query_exhaustive: bool,
}

impl ProviderCapabilities {
    pub fn supplies(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    pub fn supplies_any(&self, wanted: &[Field]) -> bool {
        wanted.iter().any(|f| self.supplies(*f))
    }
}

/// Rate limiting configuration for a provider.
///
/// Holds the provider's *published* limits. The limiter applies
/// `safety_factor` so that we stay strictly below them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    /// Published requests per minute.
    pub requests_per_minute: u32,

    /// Fraction of the published limit we allow ourselves.
    pub safety_factor: f64,

    /// Tokens that may be spent back to back.
    pub burst_capacity: u32,

    /// Published requests per UTC day, if the provider has a daily cap.
    pub daily_quota: Option<u32>,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            safety_factor: DEFAULT_SAFETY_FACTOR,
            burst_capacity: 1,
            daily_quota: None,
        }
    }
}

impl RateLimit {
    pub fn effective_per_minute(&self) -> f64 {
        f64::from(self.requests_per_minute) * self.safety_factor.clamp(0.01, 1.0)
    }

    pub fn effective_daily_quota(&self) -> Option<u32> {
        self.daily_quota
            .map(|q| (f64::from(q) * self.safety_factor.clamp(0.01, 1.0)).floor() as u32)
    }
}

/// Partial override of a provider's rate limit, read from configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitOverride {
    pub requests_per_minute: Option<u32>,
    pub safety_factor: Option<f64>,
    pub burst_capacity: Option<u32>,
    pub daily_quota: Option<u32>,
}

impl RateLimitOverride {
    pub fn apply(&self, base: &RateLimit) -> RateLimit {
        RateLimit {
            requests_per_minute: self.requests_per_minute.unwrap_or(base.requests_per_minute),
            safety_factor: self.safety_factor.unwrap_or(base.safety_factor),
            burst_capacity: self.burst_capacity.unwrap_or(base.burst_capacity),
            daily_quota: self.daily_quota.or(base.daily_quota),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_margin_applied() {
        let limit = RateLimit {
            requests_per_minute: 60,
            daily_quota: Some(1000),
            ..Default::default()
        };
        assert!((limit.effective_per_minute() - 54.0).abs() < f64::EPSILON);
        assert_eq!(limit.effective_daily_quota(), Some(900));
    }

    #[test]
    fn test_override_keeps_unset_values() {
        let base = RateLimit {
            requests_per_minute: 30,
            safety_factor: 0.9,
            burst_capacity: 2,
            daily_quota: Some(500),
        };
        let limit = RateLimitOverride {
            requests_per_minute: Some(20),
            ..Default::default()
        }
        .apply(&base);

        assert_eq!(limit.requests_per_minute, 20);
        assert_eq!(limit.burst_capacity, 2);
        assert_eq!(limit.daily_quota, Some(500));
    }
}
