//! Provider registry module.
//!
//! This module provides orchestration for metadata providers, including:
//! - Provider registration and trust ordering
//! - Rate limiting per provider with FIFO, priority and daily quotas
//! - Demotion of providers that keep getting rate limited
//! - Cover URL validation
//! - Per-resolution attempt diagnostics

mod cover_validator;
mod demotion;
mod diagnostics;
mod provider_registry;
mod rate_limiter;

pub use cover_validator::{
    CoverProbe, CoverRejection, CoverValidationConfig, CoverValidator, HttpCoverProbe,
};
pub use demotion::{DemotionConfig, DemotionTracker, ProviderStanding};
pub use diagnostics::{FetchDiagnostics, ProviderAttempt, SkipReason};
pub use provider_registry::{ProviderRegistry, RankedProvider};
pub use rate_limiter::{RateLimitConfig, RateLimiter, DEFAULT_BACKGROUND_MAX_WAIT};
