//! Token bucket rate limiter for metadata providers.
//!
//! Each provider gets its own lane: a token bucket, an optional daily
//! quota and two FIFO queues of waiting callers. Tokens are handed out in
//! queue order. Interactive waiters go first; a background waiter that
//! has queued longer than `background_max_wait` is served ahead of them so
//! refresh work cannot starve.
//!
//! Whichever waiter polls the lane dispatches every token that is ready,
//! so a grant never depends on the head of the queue being scheduled.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use log::{debug, warn};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::errors::MetadataError;
use crate::models::{Priority, ProviderId};
use crate::provider::RateLimit;

/// Default rate limit: 60 requests per minute.
const DEFAULT_REQUESTS_PER_MINUTE: f64 = 60.0;

/// Default bucket capacity (allows bursting).
const DEFAULT_BUCKET_CAPACITY: f64 = 10.0;

/// Default aging bound for background waiters.
pub const DEFAULT_BACKGROUND_MAX_WAIT: Duration = Duration::from_secs(30);

/// Token bucket for a single provider.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens.
    tokens: f64,
    /// Last time the bucket was updated.
    last_update: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
}

impl TokenBucket {
    /// Create a new token bucket with default settings.
    fn new() -> Self {
        Self {
            tokens: DEFAULT_BUCKET_CAPACITY,
            last_update: Instant::now(),
            rate: DEFAULT_REQUESTS_PER_MINUTE / 60.0,
            capacity: DEFAULT_BUCKET_CAPACITY,
        }
    }

    /// Create a token bucket with custom settings.
    fn with_config(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_capacity.max(1.0);
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: (config.requests_per_minute / 60.0).max(1e-6),
            capacity,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        let new_tokens = elapsed * self.rate;

        self.tokens = (self.tokens + new_tokens).min(self.capacity);
        self.last_update = now;
    }

    /// Try to acquire a token immediately.
    /// Returns true if a token was available, false otherwise.
    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Calculate the wait time until a token becomes available.
    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let tokens_needed = 1.0 - self.tokens;
            let seconds_needed = tokens_needed / self.rate;
            Duration::from_secs_f64(seconds_needed)
        }
    }
}

/// Requests per UTC day, reset at midnight.
#[derive(Debug)]
struct DailyQuota {
    limit: u32,
    used: u32,
    day: NaiveDate,
}

impl DailyQuota {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            used: 0,
            day: Utc::now().date_naive(),
        }
    }

    fn roll_over(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.day {
            self.day = today;
            self.used = 0;
        }
    }

    fn remaining(&mut self) -> u32 {
        self.roll_over();
        self.limit.saturating_sub(self.used)
    }
}

/// Rate limiter configuration for a provider.
///
/// Values are the effective ones, after the safety factor.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum requests per minute.
    pub requests_per_minute: f64,
    /// Maximum burst capacity.
    pub burst_capacity: f64,
    /// Maximum requests per UTC day.
    pub daily_quota: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            burst_capacity: DEFAULT_BUCKET_CAPACITY,
            daily_quota: None,
        }
    }
}

impl From<&RateLimit> for RateLimitConfig {
    fn from(limit: &RateLimit) -> Self {
        Self {
            requests_per_minute: limit.effective_per_minute(),
            burst_capacity: f64::from(limit.burst_capacity),
            daily_quota: limit.effective_daily_quota(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    id: u64,
    enqueued_at: Instant,
}

/// Per-provider state: bucket, quota and waiters.
struct Lane {
    bucket: TokenBucket,
    quota: Option<DailyQuota>,
    interactive: VecDeque<Ticket>,
    background: VecDeque<Ticket>,
    /// Tickets that were handed a token but have not collected it yet.
    granted: HashSet<u64>,
    notify: Arc<Notify>,
}

impl Lane {
    fn new(config: Option<&RateLimitConfig>) -> Self {
        Self {
            bucket: config.map(TokenBucket::with_config).unwrap_or_else(TokenBucket::new),
            quota: config.and_then(|c| c.daily_quota).map(DailyQuota::new),
            interactive: VecDeque::new(),
            background: VecDeque::new(),
            granted: HashSet::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    fn has_waiters(&self) -> bool {
        !self.interactive.is_empty() || !self.background.is_empty()
    }

    fn quota_exhausted(&mut self) -> bool {
        self.quota.as_mut().is_some_and(|q| q.remaining() == 0)
    }

    fn consume_quota(&mut self) {
        if let Some(quota) = self.quota.as_mut() {
            quota.used += 1;
        }
    }

    /// Pop the ticket that is served next.
    fn next_ticket(&mut self, now: Instant, background_max_wait: Duration) -> Option<Ticket> {
        let aged = self
            .background
            .front()
            .is_some_and(|t| now.duration_since(t.enqueued_at) >= background_max_wait);

        if aged || self.interactive.is_empty() {
            self.background.pop_front()
        } else {
            self.interactive.pop_front()
        }
    }

    /// Hand every ready token to the waiters in order.
    fn dispatch(&mut self, background_max_wait: Duration) -> bool {
        let now = Instant::now();
        let mut granted_any = false;

        while self.has_waiters() && !self.quota_exhausted() && self.bucket.try_acquire() {
            self.consume_quota();
            if let Some(ticket) = self.next_ticket(now, background_max_wait) {
                self.granted.insert(ticket.id);
                granted_any = true;
            }
        }
        granted_any
    }

    fn remove(&mut self, ticket: u64) {
        self.interactive.retain(|t| t.id != ticket);
        self.background.retain(|t| t.id != ticket);
        self.granted.remove(&ticket);
    }

    fn queued(&self) -> usize {
        self.interactive.len() + self.background.len()
    }
}

enum GrantState {
    Granted,
    Wait(Duration),
}

/// Token bucket rate limiter for multiple providers.
///
/// Thread-safe rate limiter that maintains one lane per provider. Lanes
/// are created on demand with default settings, or can be pre-configured
/// with custom limits.
pub struct RateLimiter {
    /// Per-provider lanes.
    lanes: Mutex<HashMap<String, Lane>>,
    /// Per-provider configuration overrides.
    configs: Mutex<HashMap<String, RateLimitConfig>>,
    next_ticket: AtomicU64,
    background_max_wait: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
            background_max_wait: DEFAULT_BACKGROUND_MAX_WAIT,
        }
    }

    pub fn with_background_max_wait(mut self, max_wait: Duration) -> Self {
        self.background_max_wait = max_wait;
        self
    }

    /// Lock the lanes mutex, recovering from poison if necessary.
    ///
    /// For rate limiting, it's safe to recover from a poisoned mutex since
    /// the worst case is slightly incorrect rate limiting, which is better
    /// than panicking.
    fn lock_lanes(&self) -> MutexGuard<'_, HashMap<String, Lane>> {
        self.lanes.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter lanes mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Lock the configs mutex, recovering from poison if necessary.
    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure rate limits for a specific provider.
    ///
    /// Waiters already queued keep their place.
    pub fn configure(&self, provider: &ProviderId, config: RateLimitConfig) {
        let mut configs = self.lock_configs();
        configs.insert(provider.to_string(), config.clone());
        drop(configs); // Release configs lock before acquiring lanes lock

        let mut lanes = self.lock_lanes();
        if let Some(lane) = lanes.get_mut(provider.as_ref()) {
            lane.bucket = TokenBucket::with_config(&config);
            lane.quota = config.daily_quota.map(DailyQuota::new);
            lane.notify.notify_waiters();
        }
    }

    /// Acquire a token for the given provider.
    ///
    /// Waits in FIFO order within `priority` until a token is available.
    /// Fails with [`MetadataError::RateLimitTimeout`] once `deadline`
    /// passes, and with [`MetadataError::QuotaExhausted`] when the daily
    /// quota is spent. Either way the caller's place in the queue is
    /// released.
    pub async fn acquire(
        &self,
        provider: &ProviderId,
        priority: Priority,
        deadline: Instant,
    ) -> Result<(), MetadataError> {
        let (ticket, notify) = self.enqueue(provider, priority);
        let _guard = TicketGuard {
            limiter: self,
            provider: provider.as_ref(),
            ticket,
        };

        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait = match self.poll_grant(provider, ticket)? {
                GrantState::Granted => {
                    debug!(
                        "Rate limiter: acquired {} token for '{}'",
                        priority.as_str(),
                        provider
                    );
                    return Ok(());
                }
                GrantState::Wait(wait) => wait,
            };

            let now = Instant::now();
            if now >= deadline {
                debug!("Rate limiter: deadline passed waiting for '{}'", provider);
                return Err(MetadataError::RateLimitTimeout {
                    provider: provider.to_string(),
                });
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until((now + wait).min(deadline)) => {}
            }
        }
    }

    fn enqueue(&self, provider: &ProviderId, priority: Priority) -> (u64, Arc<Notify>) {
        let id = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let ticket = Ticket {
            id,
            enqueued_at: Instant::now(),
        };

        let mut lanes = self.lock_lanes();
        let lane = lanes
            .entry(provider.to_string())
            .or_insert_with(|| self.create_lane(provider));

        match priority {
            Priority::Interactive => lane.interactive.push_back(ticket),
            Priority::Background => lane.background.push_back(ticket),
        }
        (id, Arc::clone(&lane.notify))
    }

    fn poll_grant(&self, provider: &ProviderId, ticket: u64) -> Result<GrantState, MetadataError> {
        let mut lanes = self.lock_lanes();
        let lane = lanes
            .entry(provider.to_string())
            .or_insert_with(|| self.create_lane(provider));

        if lane.dispatch(self.background_max_wait) {
            lane.notify.notify_waiters();
        }

        if lane.granted.remove(&ticket) {
            return Ok(GrantState::Granted);
        }

        if lane.quota_exhausted() {
            lane.remove(ticket);
            return Err(MetadataError::QuotaExhausted {
                provider: provider.to_string(),
            });
        }

        Ok(GrantState::Wait(lane.bucket.time_until_available()))
    }

    /// Try to acquire a token without waiting.
    ///
    /// Returns true if a token was acquired, false if rate limited or if
    /// other callers are already queued.
    pub fn try_acquire(&self, provider: &ProviderId) -> bool {
        let mut lanes = self.lock_lanes();

        let lane = lanes
            .entry(provider.to_string())
            .or_insert_with(|| self.create_lane(provider));

        if lane.has_waiters() || lane.quota_exhausted() || !lane.bucket.try_acquire() {
            return false;
        }
        lane.consume_quota();
        true
    }

    /// Get the remaining tokens for a provider.
    pub fn remaining_tokens(&self, provider: &ProviderId) -> f64 {
        let mut lanes = self.lock_lanes();

        if let Some(lane) = lanes.get_mut(provider.as_ref()) {
            lane.bucket.refill();
            lane.bucket.tokens
        } else {
            self.lock_configs()
                .get(provider.as_ref())
                .map(|c| c.burst_capacity.max(1.0))
                .unwrap_or(DEFAULT_BUCKET_CAPACITY)
        }
    }

    /// Requests left today, if the provider has a daily quota.
    pub fn remaining_quota(&self, provider: &ProviderId) -> Option<u32> {
        let mut lanes = self.lock_lanes();
        match lanes.get_mut(provider.as_ref()) {
            Some(lane) => lane.quota.as_mut().map(DailyQuota::remaining),
            None => self
                .lock_configs()
                .get(provider.as_ref())
                .and_then(|c| c.daily_quota),
        }
    }

    /// Number of callers waiting on a provider.
    pub fn queued(&self, provider: &ProviderId) -> usize {
        self.lock_lanes()
            .get(provider.as_ref())
            .map(Lane::queued)
            .unwrap_or(0)
    }

    /// Reset the bucket and quota for a provider.
    pub fn reset(&self, provider: &ProviderId) {
        let config = self.lock_configs().get(provider.as_ref()).cloned();
        let mut lanes = self.lock_lanes();
        if let Some(lane) = lanes.get_mut(provider.as_ref()) {
            lane.bucket = config
                .as_ref()
                .map(TokenBucket::with_config)
                .unwrap_or_else(TokenBucket::new);
            lane.quota = config.and_then(|c| c.daily_quota).map(DailyQuota::new);
            lane.notify.notify_waiters();
        }
    }

    /// Create a lane for a provider, using custom config if available.
    fn create_lane(&self, provider: &ProviderId) -> Lane {
        let configs = self.lock_configs();
        Lane::new(configs.get(provider.as_ref()))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases a caller's queue slot when `acquire` returns or is dropped.
struct TicketGuard<'a> {
    limiter: &'a RateLimiter,
    provider: &'a str,
    ticket: u64,
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        let mut lanes = self.limiter.lock_lanes();
        if let Some(lane) = lanes.get_mut(self.provider) {
            lane.remove(self.ticket);
            lane.notify.notify_waiters();
        }
    }
}
