use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;
use shelfmark_core::cache::{CacheStore, EntrySummary, SeriesWrite};
use shelfmark_core::catalog::{CacheEntry, SeriesKey, VolumeRecord};
use shelfmark_core::errors::{CacheError, CacheResult};

use super::model::{SeriesRowDB, VolumeRowDB};
use crate::db::{self, get_connection, DbPool, WriteHandle};
use crate::errors::{IntoCache, StorageError};
use crate::schema::{series_cache, volume_records};

/// `CacheStore` over SQLite. Reads use the pool; writes go through the
/// single writer actor.
pub struct SqliteCacheStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteCacheStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        SqliteCacheStore { pool, writer }
    }

    /// Open the database in `data_dir`, migrate it and start the writer.
    /// Must be called inside a Tokio runtime.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let pool = db::init(data_dir)?;
        let writer = db::spawn_writer(Arc::clone(&pool));
        Ok(Self::new(pool, writer))
    }

    pub fn pool(&self) -> &Arc<DbPool> {
        &self.pool
    }
}

fn load_series(conn: &mut SqliteConnection, key: &str) -> CacheResult<Option<SeriesRowDB>> {
    series_cache::table
        .find(key)
        .select(SeriesRowDB::as_select())
        .first(conn)
        .optional()
        .into_cache()
}

fn load_volumes(
    conn: &mut SqliteConnection,
    key: &str,
    numbers: Option<&[i32]>,
) -> CacheResult<Vec<VolumeRowDB>> {
    let mut query = volume_records::table
        .filter(volume_records::series_key.eq(key))
        .select(VolumeRowDB::as_select())
        .order(volume_records::volume_number.asc())
        .into_boxed();
    if let Some(numbers) = numbers {
        query = query.filter(volume_records::volume_number.eq_any(numbers.to_vec()));
    }
    query.load(conn).into_cache()
}

fn volume_numbers(volumes: &BTreeSet<u32>) -> CacheResult<Vec<i32>> {
    volumes
        .iter()
        .map(|n| {
            i32::try_from(*n)
                .map_err(|_| CacheError::QueryFailed(format!("volume number {} out of range", n)))
        })
        .collect()
}

/// Read-merge-write of one series inside the writer's transaction.
fn apply_write(conn: &mut SqliteConnection, write: &SeriesWrite) -> CacheResult<Vec<VolumeRecord>> {
    let key = write.key.as_str();
    let numbers: BTreeSet<u32> = write.records.iter().map(|r| r.volume_number).collect();
    let numbers = volume_numbers(&numbers)?;

    let mut entry = match load_series(conn, key)? {
        Some(row) => {
            let volumes = load_volumes(conn, key, Some(&numbers))?;
            row.into_entry(volumes).into_cache()?
        }
        None => write.empty_entry(),
    };
    let merged = write.apply_to(&mut entry);

    // Upsert in place: a REPLACE would delete the row and cascade to its volumes.
    let series_row = SeriesRowDB::from(&entry);
    diesel::insert_into(series_cache::table)
        .values(&series_row)
        .on_conflict(series_cache::series_key)
        .do_update()
        .set(&series_row)
        .execute(conn)
        .into_cache()?;

    let rows = merged
        .iter()
        .map(VolumeRowDB::from_record)
        .collect::<Result<Vec<_>, _>>()
        .into_cache()?;
    for row in &rows {
        diesel::insert_into(volume_records::table)
            .values(row)
            .on_conflict((volume_records::series_key, volume_records::volume_number))
            .do_update()
            .set(row)
            .execute(conn)
            .into_cache()?;
    }
    debug!("Stored {} volume(s) of '{}'", rows.len(), key);
    Ok(merged)
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    fn lookup_exact(&self, key: &SeriesKey) -> CacheResult<Option<CacheEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let Some(row) = load_series(&mut conn, key.as_str())? else {
            return Ok(None);
        };
        let volumes = load_volumes(&mut conn, key.as_str(), None)?;
        row.into_entry(volumes).map(Some).into_cache()
    }

    fn series_names(&self) -> CacheResult<Vec<(SeriesKey, String)>> {
        let mut conn = get_connection(&self.pool)?;
        let rows: Vec<(String, String)> = series_cache::table
            .select((series_cache::series_key, series_cache::display_name))
            .load(&mut conn)
            .into_cache()?;
        Ok(rows
            .into_iter()
            .map(|(key, name)| (SeriesKey::from_normalized(key), name))
            .collect())
    }

    fn batch_get(
        &self,
        key: &SeriesKey,
        volumes: &BTreeSet<u32>,
    ) -> CacheResult<BTreeMap<u32, VolumeRecord>> {
        if volumes.is_empty() {
            return Ok(BTreeMap::new());
        }
        let numbers = volume_numbers(volumes)?;
        let mut conn = get_connection(&self.pool)?;
        load_volumes(&mut conn, key.as_str(), Some(&numbers))?
            .into_iter()
            .map(|row| row.into_record().map(|r| (r.volume_number, r)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .into_cache()
    }

    fn entry_summaries(&self) -> CacheResult<Vec<EntrySummary>> {
        let mut conn = get_connection(&self.pool)?;
        let series: Vec<SeriesRowDB> = series_cache::table
            .select(SeriesRowDB::as_select())
            .load(&mut conn)
            .into_cache()?;
        let volumes: Vec<VolumeRowDB> = volume_records::table
            .select(VolumeRowDB::as_select())
            .load(&mut conn)
            .into_cache()?;

        let mut by_series: HashMap<String, Vec<VolumeRowDB>> = HashMap::new();
        for row in volumes {
            by_series.entry(row.series_key.clone()).or_default().push(row);
        }

        series
            .into_iter()
            .map(|row| {
                let rows = by_series.remove(&row.series_key).unwrap_or_default();
                row.into_entry(rows).map(|entry| EntrySummary::from(&entry))
            })
            .collect::<Result<Vec<_>, _>>()
            .into_cache()
    }

    async fn upsert(&self, record: VolumeRecord) -> CacheResult<VolumeRecord> {
        let key = record.series_key.clone();
        let display_name = key.to_string();
        let mut merged = self
            .write_series(SeriesWrite::new(key, display_name, vec![record]))
            .await?;
        merged
            .pop()
            .ok_or_else(|| CacheError::Internal("upsert stored nothing".to_string()))
    }

    async fn write_series(&self, write: SeriesWrite) -> CacheResult<Vec<VolumeRecord>> {
        self.writer.exec(move |conn| apply_write(conn, &write)).await
    }
}
