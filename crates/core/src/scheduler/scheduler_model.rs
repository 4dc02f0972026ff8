use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::EntrySummary;
use crate::catalog::SeriesKey;
use crate::errors::{Error, Result};

/// High-demand titles backfilled first.
pub const DEFAULT_POPULARITY_HINTS: [&str; 9] = [
    "One Piece",
    "Dragon Ball Z",
    "Tokyo Ghoul",
    "Tokyo Ghoul:re",
    "Bleach",
    "Naruto",
    "Bakuman",
    "Assassination Classroom",
    "Hunter x Hunter",
];

/// Weights of the three priority terms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    /// Weight of `1 - completeness`.
    pub incompleteness: f64,
    /// Weight of time since the last attempt, saturating at the horizon.
    pub staleness: f64,
    /// Weight of the configured popularity hint.
    pub popularity: f64,
    pub staleness_horizon_hours: u64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            incompleteness: 1.0,
            staleness: 0.5,
            popularity: 2.0,
            staleness_horizon_hours: 168,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Most tasks emitted per run.
    pub batch_size: usize,
    /// Entries attempted more recently than this are left alone.
    pub cooldown_secs: u64,
    /// Resolutions run in parallel within one run.
    pub concurrency: usize,
    pub task_deadline_secs: u64,
    /// Failed runs before a series is parked until its entry changes.
    pub max_task_attempts: u32,
    /// How long a background waiter may queue behind interactive ones.
    pub background_max_wait_ms: u64,
    pub weights: PriorityWeights,
    /// Series names in descending demand.
    pub popularity_hints: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            batch_size: 10,
            cooldown_secs: 3600,
            concurrency: 2,
            task_deadline_secs: 120,
            max_task_attempts: 5,
            background_max_wait_ms: 30_000,
            weights: PriorityWeights::default(),
            popularity_hints: DEFAULT_POPULARITY_HINTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.cooldown_secs).unwrap_or(i64::MAX))
    }

    pub fn task_deadline(&self) -> Duration {
        Duration::from_secs(self.task_deadline_secs)
    }

    pub fn background_max_wait(&self) -> Duration {
        Duration::from_millis(self.background_max_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 || self.batch_size == 0 || self.concurrency == 0 {
            return Err(Error::InvalidConfigValue(
                "scheduler interval_secs, batch_size and concurrency must be positive".to_string(),
            ));
        }
        if self.task_deadline_secs == 0 || self.max_task_attempts == 0 {
            return Err(Error::InvalidConfigValue(
                "scheduler task_deadline_secs and max_task_attempts must be positive".to_string(),
            ));
        }
        let w = &self.weights;
        if [w.incompleteness, w.staleness, w.popularity]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
            || w.staleness_horizon_hours == 0
        {
            return Err(Error::InvalidConfigValue(
                "priority weights must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Hint score in [0, 1]: 1 for the first hint, falling linearly, 0 when
    /// the series is not listed.
    pub fn popularity(&self, key: &SeriesKey) -> f64 {
        let count = self.popularity_hints.len();
        self.popularity_hints
            .iter()
            .position(|hint| SeriesKey::normalize(hint) == *key)
            .map_or(0.0, |i| 1.0 - i as f64 / count as f64)
    }

    /// Priority of an entry; higher runs first.
    pub fn score(&self, summary: &EntrySummary, now: DateTime<Utc>) -> f64 {
        let w = &self.weights;
        let staleness = match summary.last_attempted {
            None => 1.0,
            Some(at) => {
                let hours = (now - at).num_seconds().max(0) as f64 / 3600.0;
                (hours / w.staleness_horizon_hours as f64).min(1.0)
            }
        };
        w.incompleteness * (1.0 - summary.effective_completeness)
            + w.staleness * staleness
            + w.popularity * self.popularity(&summary.key)
    }
}

/// What one scheduler run did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerRunReport {
    pub selected: usize,
    pub completed: usize,
    pub partial: usize,
    pub failed: usize,
    /// Series given up on after repeated failures.
    pub parked: usize,
}
