//! Local list-price estimator.
//!
//! No network. Publishers price manga in a handful of tiers by format, so
//! when no storefront reported a USD price the series name decides the
//! tier. Consulted last; any real price fills the field first.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::MetadataError;
use crate::models::{Field, ProviderResult, VolumeFields};
use crate::provider::{MetadataProvider, ProviderCapabilities, RateLimit};

const PROVIDER_ID: &str = "MSRP_ESTIMATE";

const FIELDS: &[Field] = &[Field::Msrp];

/// Format keywords and their price in cents, checked in order.
const PRICE_TIERS: &[(&[&str], i64)] = &[
    (&["deluxe", "collector", "premium", "special edition"], 1999),
    (&["omnibus", "3-in-1", "2-in-1"], 1499),
    (&["light novel", "novel"], 1499),
];

const STANDARD_PRICE_CENTS: i64 = 999;

#[derive(Debug, Default, Clone, Copy)]
pub struct MsrpEstimateProvider;

impl MsrpEstimateProvider {
    pub fn new() -> Self {
        Self
    }

    fn estimate(&self, series_name: &str, volume: u32) -> ProviderResult {
        let fields = VolumeFields {
            msrp: Some(estimate_price(series_name)),
            ..Default::default()
        };
        ProviderResult::new(PROVIDER_ID, volume, fields)
    }
}

#[async_trait]
impl MetadataProvider for MsrpEstimateProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            fields: FIELDS,
            supports_series_query: true,
            series_query_exhaustive: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 600,
            burst_capacity: 10,
            ..RateLimit::default()
        }
    }

    async fn fetch_volume(
        &self,
        series_name: &str,
        volume: u32,
    ) -> Result<ProviderResult, MetadataError> {
        Ok(self.estimate(series_name, volume))
    }

    async fn fetch_series(
        &self,
        series_name: &str,
        volumes: &[u32],
    ) -> Result<Vec<ProviderResult>, MetadataError> {
        Ok(volumes
            .iter()
            .map(|v| self.estimate(series_name, *v))
            .collect())
    }
}

pub fn estimate_price(series_name: &str) -> Decimal {
    let lower = series_name.to_lowercase();
    let cents = PRICE_TIERS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, cents)| *cents)
        .unwrap_or(STANDARD_PRICE_CENTS);
    Decimal::new(cents, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_tiers() {
        assert_eq!(estimate_price("Berserk Deluxe Edition"), dec!(19.99));
        assert_eq!(estimate_price("Naruto 3-in-1 Edition"), dec!(14.99));
        assert_eq!(estimate_price("Sword Art Online (light novel)"), dec!(14.99));
        assert_eq!(estimate_price("One Piece"), dec!(9.99));
    }

    #[tokio::test]
    async fn test_series_query_covers_every_volume() {
        let provider = MsrpEstimateProvider::new();
        let results = provider.fetch_series("Bleach", &[1, 2, 3]).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .all(|r| r.fields.present() == vec![Field::Msrp] && r.provider_id == "MSRP_ESTIMATE"));
    }
}
