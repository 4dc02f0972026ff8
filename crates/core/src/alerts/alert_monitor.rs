//! Edge-triggered detection of infrastructure-wide failure.
//!
//! Individual provider errors and single cache failures are normal and
//! only degrade a resolution. The monitor raises an alert once when
//! - every configured provider's latest outcome is a permanent failure, or
//! - the cache has failed continuously for the outage window,
//!
//! and re-arms when the condition clears.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::time::Instant;

use super::{AlertSink, OperationalAlert};

#[derive(Default)]
struct MonitorState {
    /// Provider id -> latest outcome was permanent.
    permanent: HashMap<String, bool>,
    providers_alerted: bool,
    cache_down_since: Option<(Instant, DateTime<Utc>)>,
    cache_alerted: bool,
}

pub struct AlertMonitor {
    sink: Arc<dyn AlertSink>,
    providers: Vec<String>,
    cache_outage: Duration,
    state: Mutex<MonitorState>,
}

impl AlertMonitor {
    pub fn new(sink: Arc<dyn AlertSink>, providers: Vec<String>, cache_outage: Duration) -> Self {
        Self {
            sink,
            providers,
            cache_outage,
            state: Mutex::new(MonitorState::default()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Alert monitor mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Record a provider call outcome.
    pub fn record_provider(&self, provider_id: &str, permanent_failure: bool) {
        let alert = {
            let mut state = self.lock_state();
            state
                .permanent
                .insert(provider_id.to_string(), permanent_failure);

            let all_failing = !self.providers.is_empty()
                && self
                    .providers
                    .iter()
                    .all(|p| state.permanent.get(p).copied().unwrap_or(false));

            if !all_failing {
                if state.providers_alerted {
                    info!("Provider '{}' answered again, provider alert cleared", provider_id);
                }
                state.providers_alerted = false;
                None
            } else if state.providers_alerted {
                None
            } else {
                state.providers_alerted = true;
                Some(OperationalAlert::AllProvidersFailing {
                    providers: self.providers.clone(),
                })
            }
        };

        if let Some(alert) = alert {
            self.sink.emit(alert);
        }
    }

    pub fn record_cache_ok(&self) {
        let mut state = self.lock_state();
        if state.cache_down_since.take().is_some() {
            info!("Cache store reachable again");
        }
        state.cache_alerted = false;
    }

    pub fn record_cache_failure(&self, error: &str) {
        let alert = {
            let mut state = self.lock_state();
            let now = Instant::now();
            let (down_at, since) = *state.cache_down_since.get_or_insert((now, Utc::now()));

            if state.cache_alerted || now.duration_since(down_at) < self.cache_outage {
                None
            } else {
                state.cache_alerted = true;
                Some(OperationalAlert::CacheUnreachable {
                    since,
                    last_error: error.to_string(),
                })
            }
        };

        if let Some(alert) = alert {
            self.sink.emit(alert);
        }
    }

    /// Whether the cache's last observed call failed.
    pub fn cache_degraded(&self) -> bool {
        self.lock_state().cache_down_since.is_some()
    }
}
