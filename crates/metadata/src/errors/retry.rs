use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classification for retry policy.
///
/// Used by the resolver to decide what happens after a provider call fails.
///
/// # Behavior Summary
///
/// | Class | Retry same provider? | Continue chain? | Demotion penalty? |
/// |-------|---------------------|-----------------|-------------------|
/// | `NextProvider` | No | Yes | No |
/// | `WithBackoff` | Yes, bounded | Yes, once attempts run out | No |
/// | `BackoffWithPenalty` | Yes, escalated delay | Yes | Yes |
/// | `SkipProvider` | No | Yes (provider dropped for this key) | No |
/// | `Abort` | No | No | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// The provider answered but has nothing for this request.
    NextProvider,

    /// Network trouble, 5xx or timeout. Worth another try after a delay.
    WithBackoff,

    /// The provider pushed back with a 429. Retry with a longer delay and
    /// record a penalty so that repeated pushback demotes the provider.
    BackoffWithPenalty,

    /// Malformed request, auth failure, unsupported operation or exhausted
    /// quota. Retrying cannot help; skip the provider for this key.
    SkipProvider,

    /// The caller's deadline elapsed. Nothing else is attempted.
    Abort,
}

/// Bounded exponential backoff between attempts against one provider.
///
/// `max_attempts` counts the first call, so the default of 3 means one
/// call plus at most two retries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_attempts: u32,
    /// Extra multiplier applied after a 429.
    pub rate_limited_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            factor: 2.0,
            max_attempts: 3,
            rate_limited_multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the `attempt`-th failed call (1-based).
    ///
    /// A provider-supplied `retry_after` is honoured when it is longer than
    /// the computed delay, still subject to `max_delay_ms`.
    pub fn delay_for(
        &self,
        attempt: u32,
        class: RetryClass,
        retry_after: Option<Duration>,
    ) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let mut millis = self.base_delay_ms as f64 * self.factor.max(1.0).powi(exponent);

        if class == RetryClass::BackoffWithPenalty {
            millis *= self.rate_limited_multiplier.max(1.0);
        }

        let mut delay = Duration::from_millis(millis.round() as u64);
        if let Some(requested) = retry_after {
            delay = delay.max(requested);
        }
        delay.min(Duration::from_millis(self.max_delay_ms))
    }

    /// Whether another attempt is allowed after `attempts` calls.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts.max(1)
    }
}
