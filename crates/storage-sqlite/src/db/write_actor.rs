use std::any::Any;

use diesel::SqliteConnection;
use log::{error, warn};
use shelfmark_core::errors::{CacheError, CacheResult};
use tokio::sync::{mpsc, oneshot};

use super::{DbConnection, DbPool};
use crate::errors::StorageError;

// A write job runs on the actor's connection inside one immediate transaction.
type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> CacheResult<T> + Send + 'static>;
type AnyBox = Box<dyn Any + Send + 'static>;

/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<(Job<AnyBox>, oneshot::Sender<CacheResult<AnyBox>>)>,
}

impl WriteHandle {
    /// Run `job` on the writer's connection. Jobs run one at a time, in
    /// submission order, each in its own transaction.
    pub async fn exec<F, T>(&self, job: F) -> CacheResult<T>
    where
        F: FnOnce(&mut SqliteConnection) -> CacheResult<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as AnyBox)),
                ret_tx,
            ))
            .await
            .map_err(|_| StorageError::WriterUnavailable("writer actor stopped".to_string()))?;

        let boxed = ret_rx.await.map_err(|_| {
            StorageError::WriterUnavailable("writer actor dropped the reply".to_string())
        })??;

        boxed
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| CacheError::Internal("writer returned an unexpected type".to_string()))
    }
}

/// Spawn the single writer. Every cache write goes through it, so
/// concurrent merge-writes for one series never interleave.
pub fn spawn_writer(pool: std::sync::Arc<DbPool>) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<(Job<AnyBox>, oneshot::Sender<CacheResult<AnyBox>>)>(1024);

    tokio::spawn(async move {
        // Held across jobs; reacquired after a failure.
        let mut conn: Option<DbConnection> = None;

        while let Some((job, reply_tx)) = rx.recv().await {
            if conn.is_none() {
                match pool.get() {
                    Ok(c) => conn = Some(c),
                    Err(e) => {
                        warn!("Cache writer could not get a connection: {}", e);
                        let _ = reply_tx.send(Err(StorageError::from(e).into()));
                        continue;
                    }
                }
            }
            let Some(c) = conn.as_mut() else {
                continue;
            };

            let result: CacheResult<AnyBox> = c
                .immediate_transaction::<_, StorageError, _>(|c| job(c).map_err(StorageError::from))
                .map_err(CacheError::from);

            if matches!(&result, Err(e) if e.is_unavailable()) {
                error!("Cache writer connection failed, will reconnect");
                conn = None;
            }
            // The caller may have given up waiting.
            let _ = reply_tx.send(result);
        }
    });

    WriteHandle { tx }
}
