//! Alert types and sinks.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::Serialize;

/// An infrastructure-wide failure.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationalAlert {
    /// The latest answer from every configured provider was a permanent failure.
    AllProvidersFailing { providers: Vec<String> },

    /// The cache store has been unreachable for longer than the configured window.
    CacheUnreachable {
        since: DateTime<Utc>,
        last_error: String,
    },
}

impl fmt::Display for OperationalAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllProvidersFailing { providers } => write!(
                f,
                "every configured provider is failing permanently: {}",
                providers.join(", ")
            ),
            Self::CacheUnreachable { since, last_error } => write!(
                f,
                "cache store unreachable since {} ({})",
                since.to_rfc3339(),
                last_error
            ),
        }
    }
}

/// Receiver of operational alerts.
///
/// `emit()` must not block; alerting is best-effort.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: OperationalAlert);
}

/// Writes alerts to the log at error level.
#[derive(Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn emit(&self, alert: OperationalAlert) {
        error!(target: "shelfmark::alert", "{}", alert);
    }
}

/// Collects alerts in memory.
#[derive(Clone, Default)]
pub struct RecordingAlertSink {
    alerts: Arc<Mutex<Vec<OperationalAlert>>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_alerts(&self) -> MutexGuard<'_, Vec<OperationalAlert>> {
        self.alerts.lock().unwrap_or_else(|poisoned| {
            warn!("Alert sink mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn alerts(&self) -> Vec<OperationalAlert> {
        self.lock_alerts().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_alerts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_alerts().is_empty()
    }
}

impl AlertSink for RecordingAlertSink {
    fn emit(&self, alert: OperationalAlert) {
        self.lock_alerts().push(alert);
    }
}
