//! Error types and retry classification for the metadata crate.
//!
//! This module provides:
//! - [`MetadataError`]: The shared taxonomy every provider adapter maps into
//! - [`RetryClass`]: How the fallback chain reacts to each error
//! - [`BackoffPolicy`]: Bounded exponential backoff between retries

mod retry;

pub use retry::{BackoffPolicy, RetryClass};

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a metadata provider.
///
/// Each variant is classified into a [`RetryClass`] via the [`retry_class`](Self::retry_class)
/// method, which determines how the resolver treats the failure.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// The provider has no data for this series or volume.
    /// Normal outcome; the chain continues with the next provider.
    #[error("Not found: {provider}")]
    NotFound {
        /// The provider that had no data
        provider: String,
    },

    /// A 5xx response, dropped connection or unparsable body.
    /// Retried against the same provider with backoff.
    #[error("Transient failure: {provider} - {message}")]
    Transient {
        /// The provider that failed
        provider: String,
        /// What went wrong
        message: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider rate limited the request (HTTP 429).
    /// Retried with escalated backoff; repeated occurrences demote the provider.
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
        /// Delay requested by the provider, if it sent one
        retry_after: Option<Duration>,
    },

    /// Malformed request or authentication failure.
    /// The provider is skipped for this key without retrying.
    #[error("Permanent failure: {provider} - {message}")]
    Permanent {
        /// The provider that rejected the request
        provider: String,
        /// The rejection reason
        message: String,
    },

    /// The provider does not implement the requested operation.
    #[error("Operation '{operation}' not supported by {provider}")]
    NotSupported {
        /// The operation that was attempted
        operation: String,
        /// The provider that lacks it
        provider: String,
    },

    /// The provider's daily quota is used up until the next UTC day.
    #[error("Daily quota exhausted: {provider}")]
    QuotaExhausted {
        /// The provider whose quota is spent
        provider: String,
    },

    /// No rate limiter token became available before the caller's deadline.
    #[error("Timed out waiting for a rate limit token: {provider}")]
    RateLimitTimeout {
        /// The provider whose bucket was empty
        provider: String,
    },

    /// The caller's deadline passed while the provider call was in flight.
    #[error("Deadline exceeded: {provider}")]
    DeadlineExceeded {
        /// The provider whose call was abandoned
        provider: String,
    },

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MetadataError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::NextProvider`]: nothing here, advance the chain
    /// - [`RetryClass::WithBackoff`]: retry the same provider after a delay
    /// - [`RetryClass::BackoffWithPenalty`]: retry after an escalated delay, count a demotion penalty
    /// - [`RetryClass::SkipProvider`]: stop using this provider for the key
    /// - [`RetryClass::Abort`]: the deadline is gone, stop the whole chain
    ///
    /// # Examples
    ///
    /// ```
    /// use shelfmark_metadata::errors::{MetadataError, RetryClass};
    ///
    /// let error = MetadataError::RateLimited { provider: "JIKAN".to_string(), retry_after: None };
    /// assert_eq!(error.retry_class(), RetryClass::BackoffWithPenalty);
    ///
    /// let error = MetadataError::NotFound { provider: "JIKAN".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::NextProvider);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::NotFound { .. } => RetryClass::NextProvider,

            Self::Transient { .. } | Self::Timeout { .. } | Self::Network(_) => {
                RetryClass::WithBackoff
            }

            Self::RateLimited { .. } => RetryClass::BackoffWithPenalty,

            Self::Permanent { .. } | Self::NotSupported { .. } | Self::QuotaExhausted { .. } => {
                RetryClass::SkipProvider
            }

            Self::RateLimitTimeout { .. } | Self::DeadlineExceeded { .. } => RetryClass::Abort,
        }
    }

    /// Provider-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// True for failures that mean the provider cannot serve us at all
    /// (bad credentials, malformed requests).
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_advances_chain() {
        let error = MetadataError::NotFound {
            provider: "MANGADEX".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::NextProvider);
    }

    #[test]
    fn test_transient_and_timeout_retry_with_backoff() {
        let error = MetadataError::Transient {
            provider: "GOOGLE_BOOKS".to_string(),
            message: "HTTP 503".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);

        let error = MetadataError::Timeout {
            provider: "GOOGLE_BOOKS".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_rate_limited_escalates() {
        let error = MetadataError::RateLimited {
            provider: "JIKAN".to_string(),
            retry_after: Some(Duration::from_secs(4)),
        };
        assert_eq!(error.retry_class(), RetryClass::BackoffWithPenalty);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_permanent_family_skips_provider() {
        let permanent = MetadataError::Permanent {
            provider: "GOOGLE_BOOKS".to_string(),
            message: "API key not valid".to_string(),
        };
        assert_eq!(permanent.retry_class(), RetryClass::SkipProvider);
        assert!(permanent.is_permanent());

        let quota = MetadataError::QuotaExhausted {
            provider: "WIKIPEDIA".to_string(),
        };
        assert_eq!(quota.retry_class(), RetryClass::SkipProvider);
        assert!(!quota.is_permanent());

        let unsupported = MetadataError::NotSupported {
            operation: "series query".to_string(),
            provider: "WIKIPEDIA".to_string(),
        };
        assert_eq!(unsupported.retry_class(), RetryClass::SkipProvider);
    }

    #[test]
    fn test_deadline_errors_abort() {
        let error = MetadataError::RateLimitTimeout {
            provider: "JIKAN".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Abort);

        let error = MetadataError::DeadlineExceeded {
            provider: "JIKAN".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Abort);
    }

    #[test]
    fn test_error_display() {
        let error = MetadataError::NotFound {
            provider: "WIKIPEDIA".to_string(),
        };
        assert_eq!(format!("{}", error), "Not found: WIKIPEDIA");

        let error = MetadataError::Permanent {
            provider: "GOOGLE_BOOKS".to_string(),
            message: "HTTP 403".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Permanent failure: GOOGLE_BOOKS - HTTP 403"
        );
    }
}
