//! Cache priority scheduler.
//!
//! Every interval: score the incomplete, not-recently-attempted cache
//! entries, take the best `batch_size` and resolve them at background
//! priority through the same resolver interactive lookups use. A series
//! whose runs keep failing is parked until its entry changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use shelfmark_metadata::Priority;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{SchedulerConfig, SchedulerRunReport};
use crate::catalog::{FetchTask, SeriesKey};
use crate::errors::Result;
use crate::resolver::{Resolution, ResolutionStatus, ResolveRequest, Resolver};

#[derive(Default)]
struct TaskBook {
    /// Series whose last run failed, with their attempt count.
    failing: HashMap<SeriesKey, FetchTask>,
    /// Series given up on, and when.
    parked: HashMap<SeriesKey, DateTime<Utc>>,
}

enum Outcome {
    Completed,
    Partial,
    Failed,
    Parked,
}

pub struct CacheScheduler {
    resolver: Resolver,
    config: SchedulerConfig,
    completeness_threshold: f64,
    book: Mutex<TaskBook>,
}

impl CacheScheduler {
    pub fn new(resolver: Resolver, config: SchedulerConfig, completeness_threshold: f64) -> Self {
        Self {
            resolver,
            config,
            completeness_threshold,
            book: Mutex::new(TaskBook::default()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn lock_book(&self) -> MutexGuard<'_, TaskBook> {
        self.book.lock().unwrap_or_else(|poisoned| {
            warn!("Scheduler task book was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// The tasks a run started at `now` would execute, best first.
    pub fn select(&self, now: DateTime<Utc>) -> Result<Vec<FetchTask>> {
        let summaries = self.resolver.core().store().entry_summaries()?;
        let cooldown = self.config.cooldown();
        let book = self.lock_book();

        let mut candidates: Vec<(f64, FetchTask)> = summaries
            .into_iter()
            .filter(|s| s.volume_count > 0)
            .filter(|s| s.effective_completeness + f64::EPSILON < self.completeness_threshold)
            .filter(|s| s.last_attempted.map_or(true, |at| now - at >= cooldown))
            .filter(|s| {
                book.parked
                    .get(&s.key)
                    .map_or(true, |parked_at| s.last_updated > *parked_at)
            })
            .map(|s| {
                let score = self.config.score(&s, now);
                let task = book.failing.get(&s.key).cloned().unwrap_or_else(|| {
                    let mut task = FetchTask::new(&s.display_name, None, Priority::Background);
                    task.key = s.key.clone();
                    task
                });
                (score, task)
            })
            .collect();

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.key.cmp(&b.1.key)));
        Ok(candidates
            .into_iter()
            .take(self.config.batch_size)
            .map(|(_, task)| task)
            .collect())
    }

    /// Select and resolve one batch.
    pub async fn run_once(&self) -> Result<SchedulerRunReport> {
        let tasks = self.select(Utc::now())?;
        let mut report = SchedulerRunReport {
            selected: tasks.len(),
            ..Default::default()
        };
        if tasks.is_empty() {
            debug!("Scheduler: nothing to backfill");
            return Ok(report);
        }

        let deadline_after = self.config.task_deadline();
        let mut runs = stream::iter(tasks)
            .map(|task| {
                let resolver = self.resolver.clone();
                async move {
                    let request = ResolveRequest::from_task(&task, Instant::now() + deadline_after);
                    let resolution = resolver.resolve(request, None).await;
                    (task, resolution)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((task, resolution)) = runs.next().await {
            match self.settle(task, &resolution) {
                Outcome::Completed => report.completed += 1,
                Outcome::Partial => report.partial += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Parked => {
                    report.failed += 1;
                    report.parked += 1;
                }
            }
        }

        info!(
            "Scheduler run: {} selected, {} completed, {} partial, {} failed, {} parked",
            report.selected, report.completed, report.partial, report.failed, report.parked
        );
        Ok(report)
    }

    fn settle(&self, mut task: FetchTask, resolution: &Resolution) -> Outcome {
        let mut book = self.lock_book();
        let failed = resolution.degraded
            || resolution.expired
            || (resolution.provider_failures > 0 && !resolution.diagnostics.has_success());

        if !failed {
            book.failing.remove(&task.key);
            return if resolution.status == ResolutionStatus::Complete {
                Outcome::Completed
            } else {
                Outcome::Partial
            };
        }

        let reason = if resolution.degraded {
            "cache unavailable".to_string()
        } else if resolution.expired {
            "deadline expired".to_string()
        } else {
            resolution.diagnostics.summary()
        };
        task.record_failure(reason, self.config.max_task_attempts);

        if task.attempts_exhausted(self.config.max_task_attempts) {
            warn!(
                "Scheduler: parking '{}' after {} failed runs ({})",
                task.key,
                task.attempts,
                task.last_error.as_deref().unwrap_or_default()
            );
            book.failing.remove(&task.key);
            book.parked.insert(task.key, Utc::now());
            Outcome::Parked
        } else {
            book.failing.insert(task.key.clone(), task);
            Outcome::Failed
        }
    }

    /// Series currently parked.
    pub fn parked(&self) -> Vec<SeriesKey> {
        self.lock_book().parked.keys().cloned().collect()
    }

    /// Run every interval until shut down.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let period = self.config.interval();

        let join = tokio::spawn(async move {
            info!("Cache scheduler started, every {:?}", period);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = stop.changed() => break,
                    outcome = self.run_once() => {
                        if let Err(e) = outcome {
                            warn!("Scheduler run failed: {}", e);
                        }
                    }
                }
            }
            info!("Cache scheduler stopped");
        });

        SchedulerHandle { shutdown, join }
    }
}

/// Handle to a spawned scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the scheduler and wait for it. A run in progress is abandoned.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
}
