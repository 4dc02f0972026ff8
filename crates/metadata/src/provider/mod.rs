//! Bibliographic metadata provider abstractions and implementations.
//!
//! This module contains:
//! - The `MetadataProvider` trait that all providers implement
//! - Provider capabilities and rate limiting configuration
//! - Concrete provider implementations (Google Books, MangaDex, etc.)
//!
//! # Architecture
//!
//! Providers are deliberately thin. They translate one series/volume
//! request into HTTP calls and map the answer back into a
//! [`ProviderResult`](crate::models::ProviderResult). Ordering, retries,
//! rate limiting and cover validation live in the registry and the
//! resolver; a provider never touches the cache.

mod capabilities;
mod traits;

pub mod http;

pub mod google_books;
pub mod jikan;
pub mod mangadex;
pub mod msrp_estimate;
pub mod wikipedia;

// Re-exports
pub use capabilities::{ProviderCapabilities, RateLimit, RateLimitOverride, DEFAULT_SAFETY_FACTOR};
pub use traits::MetadataProvider;
