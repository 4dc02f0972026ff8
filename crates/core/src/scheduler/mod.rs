//! Cache priority scheduler - background backfill of incomplete entries.

mod scheduler_model;
mod scheduler_service;

pub use scheduler_model::{PriorityWeights, SchedulerConfig, SchedulerRunReport, DEFAULT_POPULARITY_HINTS};
pub use scheduler_service::{CacheScheduler, SchedulerHandle};
