//! Batch query planner - one cache round trip per series, one fetch task
//! for whatever the cache could not answer.

mod planner_model;
mod planner_service;

pub use planner_model::{SeriesLookup, VolumeSelection, MAX_VOLUME_NUMBER};
pub use planner_service::BatchPlanner;
