//! Shelfmark Metadata Crate
//!
//! This crate talks to the external bibliographic sources the catalog
//! engine draws on, and knows nothing about the cache.
//!
//! # Overview
//!
//! - Multiple providers: Google Books, MangaDex, Jikan, Wikipedia and a
//!   local MSRP estimator
//! - One error taxonomy with a retry classification shared by all of them
//! - Per-provider token buckets with FIFO waiters, interactive/background
//!   priority, daily quotas and caller deadlines
//! - Demotion of providers that keep answering 429
//! - Cover URL validation before anything is handed back
//!
//! # Architecture
//!
//! ```text
//!  series name + volumes
//!          |
//!          v
//! +------------------+
//! | ProviderRegistry |  rate limit -> deadline -> demotion -> cover check
//! +------------------+
//!          |
//!          v
//! +------------------+
//! | MetadataProvider |  (Google Books, MangaDex, ...)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |  ProviderResult  |  one volume's nullable fields
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Field`] - The seven recognised bibliographic fields
//! - [`VolumeFields`] - A nullable set of those fields
//! - [`ProviderResult`] - One provider's answer for one volume
//! - [`MetadataError`] - Provider failure taxonomy
//! - [`RetryClass`] - What the fallback chain does with each failure

pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;

pub use errors::{BackoffPolicy, MetadataError, RetryClass};

pub use models::{Field, Priority, ProviderId, ProviderResult, VolumeFields};

pub use provider::google_books::GoogleBooksProvider;
pub use provider::jikan::JikanProvider;
pub use provider::mangadex::MangaDexProvider;
pub use provider::msrp_estimate::MsrpEstimateProvider;
pub use provider::wikipedia::WikipediaProvider;
pub use provider::{MetadataProvider, ProviderCapabilities, RateLimit, RateLimitOverride};

pub use registry::{
    CoverProbe, CoverRejection, CoverValidationConfig, CoverValidator, DemotionConfig,
    DemotionTracker, FetchDiagnostics, HttpCoverProbe, ProviderAttempt, ProviderRegistry,
    ProviderStanding, RankedProvider, RateLimitConfig, RateLimiter, SkipReason,
};
