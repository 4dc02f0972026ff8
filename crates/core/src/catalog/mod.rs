//! Catalog module - series keys, volume records, cache entries and fetch tasks.

mod catalog_model;

pub use catalog_model::{CacheEntry, FetchTask, Provenance, SeriesKey, VolumeRecord};
