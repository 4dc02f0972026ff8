//! Metadata provider trait definitions.
//!
//! This module defines the core `MetadataProvider` trait that every
//! bibliographic source implements.

use async_trait::async_trait;

use crate::errors::MetadataError;
use crate::models::ProviderResult;

use super::capabilities::{ProviderCapabilities, RateLimit};

/// Trait for metadata providers.
///
/// Implement this trait to add a new bibliographic source. Adapters own
/// request construction, response parsing and the mapping of their
/// failures into [`MetadataError`]; they never touch the cache. Rate
/// limiting, deadlines and cover validation are applied around them by
/// the registry.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use shelfmark_metadata::provider::{MetadataProvider, ProviderCapabilities, RateLimit};
///
/// struct MyProvider;
///
/// #[async_trait]
/// impl MetadataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities {
///             fields: &[Field::Description],
///             supports_series_query: false,
///             series_query_exhaustive: false,
///         }
///     }
///
///     fn rate_limit(&self) -> RateLimit {
///         RateLimit::default()
///     }
///
///     // ... implement fetch_volume
/// }
/// ```
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Should be a constant string like "GOOGLE_BOOKS", "MANGADEX", etc.
    /// Used for logging, provenance, rate limiting and configured ordering.
    fn id(&self) -> &'static str;

    /// Describes which fields this provider can supply.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Published rate limits for this provider.
    fn rate_limit(&self) -> RateLimit;

    /// Fetch metadata for a single volume.
    ///
    /// # Arguments
    ///
    /// * `series_name` - Human-readable series name (not the normalized key)
    /// * `volume` - Volume number
    ///
    /// # Returns
    ///
    /// The fields found, `MetadataError::NotFound` when the provider has no
    /// data, or another error kind on failure.
    async fn fetch_volume(
        &self,
        series_name: &str,
        volume: u32,
    ) -> Result<ProviderResult, MetadataError>;

    /// Fetch several volumes of one series in a single call.
    ///
    /// Volumes the provider knows nothing about are simply absent from the
    /// returned list. Default implementation returns `NotSupported`.
    async fn fetch_series(
        &self,
        series_name: &str,
        volumes: &[u32],
    ) -> Result<Vec<ProviderResult>, MetadataError> {
        let _ = (series_name, volumes);
        Err(MetadataError::NotSupported {
            operation: "series query".to_string(),
            provider: self.id().to_string(),
        })
    }
}
