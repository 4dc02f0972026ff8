mod model;
mod repository;

pub use model::{SeriesRowDB, VolumeRowDB};
pub use repository::SqliteCacheStore;
