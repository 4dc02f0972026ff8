//! Connection pool, migrations and the single writer.

mod write_actor;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, PooledConnection};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info};
use shelfmark_core::errors::CacheResult;

use crate::errors::{IntoCache, StorageError};

pub use write_actor::{spawn_writer, WriteHandle};

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const DB_FILE_NAME: &str = "shelfmark-cache.db";
const DEFAULT_POOL_SIZE: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection PRAGMAs.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON; \
             PRAGMA busy_timeout = {};",
            self.busy_timeout.as_millis()
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Resolve the database file under `data_dir`, creating the directory.
pub fn get_db_path(data_dir: &Path) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(data_dir).map_err(|e| {
        StorageError::MigrationFailed(format!(
            "cannot create data directory {}: {}",
            data_dir.display(),
            e
        ))
    })?;
    Ok(data_dir.join(DB_FILE_NAME))
}

pub fn create_pool(db_path: &Path) -> Result<Arc<DbPool>, StorageError> {
    debug!("Opening cache database at {}", db_path.display());
    let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
    let pool = r2d2::Pool::builder()
        .max_size(DEFAULT_POOL_SIZE)
        .connection_timeout(BUSY_TIMEOUT)
        .connection_customizer(Box::new(ConnectionOptions {
            busy_timeout: BUSY_TIMEOUT,
        }))
        .build(manager)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> CacheResult<DbConnection> {
    pool.get().into_cache()
}

pub fn run_migrations(pool: &DbPool) -> Result<(), StorageError> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
    if applied.is_empty() {
        debug!("Cache database schema is up to date");
    } else {
        info!("Applied {} cache database migration(s)", applied.len());
    }
    Ok(())
}

/// Open (creating if needed) and migrate the cache database in `data_dir`.
pub fn init(data_dir: &Path) -> Result<Arc<DbPool>, StorageError> {
    let db_path = get_db_path(data_dir)?;
    let pool = create_pool(&db_path)?;
    run_migrations(&pool)?;
    Ok(pool)
}
