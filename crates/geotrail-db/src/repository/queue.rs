//! # Upload Queue Repository
//!
//! Durable queue of samples waiting for delivery.
//!
//! ## Flush / Restore Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Queue Entry Lifecycle                                  │
//! │                                                                         │
//! │  enqueue(sample) ──► upload_queue row                                   │
//! │                            │                                            │
//! │                            ▼                                            │
//! │  flush()  DELETE ... RETURNING   (one statement, one write lock)        │
//! │                            │                                            │
//! │                            ▼                                            │
//! │                 in-flight batch (caller memory only)                    │
//! │                     │                    │                              │
//! │              delivered             delivery failed                      │
//! │                     │                    │                              │
//! │                     ▼                    ▼                              │
//! │                  dropped          restore(batch) ──► new rows           │
//! │                                   (one transaction)                     │
//! │                                                                         │
//! │  An enqueue either commits before the DELETE takes the write lock      │
//! │  (returned by this flush) or after it releases (kept for the next).    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The queue does not track who owns a flushed batch. Callers serialize
//! their flush → deliver → restore cycles.

use sqlx::SqlitePool;
use tracing::{debug, warn};

use geotrail_core::Sample;

use super::{insert_sample, SAMPLE_COLUMNS};
use crate::error::DbResult;

const TABLE: &str = "upload_queue";

/// Repository for the upload queue table.
#[derive(Debug, Clone)]
pub struct UploadQueueRepository {
    pool: SqlitePool,
}

impl UploadQueueRepository {
    /// Creates a new UploadQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UploadQueueRepository { pool }
    }

    /// Persists a copy of `sample` in the queue.
    ///
    /// Uses the queue's own key space; the returned id is unrelated to any
    /// location store id.
    pub async fn enqueue(&self, sample: &Sample) -> DbResult<i64> {
        let id = insert_sample(&self.pool, TABLE, sample).await?;

        debug!(id, timestamp = sample.timestamp, "Sample queued for upload");
        Ok(id)
    }

    /// Removes and returns every queued sample.
    ///
    /// ## Returns
    /// Samples in (timestamp, id) order, each carrying the queue id it had.
    /// An empty queue yields an empty batch.
    pub async fn flush(&self) -> DbResult<Vec<Sample>> {
        let sql = format!("DELETE FROM {TABLE} RETURNING {SAMPLE_COLUMNS}");

        let mut batch: Vec<Sample> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        // RETURNING order is unspecified.
        batch.sort_by_key(|s| (s.timestamp, s.id));

        debug!(count = batch.len(), "Upload queue flushed");
        Ok(batch)
    }

    /// Re-inserts a batch that failed to deliver.
    ///
    /// Field values are kept; rows get fresh ids. All rows commit together.
    ///
    /// ## Returns
    /// Number of restored rows.
    pub async fn restore(&self, batch: &[Sample]) -> DbResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut ordered: Vec<&Sample> = batch.iter().collect();
        ordered.sort_by_key(|s| (s.timestamp, s.id));

        let mut tx = self.pool.begin().await?;
        for sample in ordered {
            insert_sample(&mut *tx, TABLE, sample).await?;
        }
        tx.commit().await?;

        debug!(count = batch.len(), "Batch restored to upload queue");
        Ok(batch.len() as u64)
    }

    /// Counts queued samples.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM upload_queue")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Deletes every queued sample without delivering it.
    ///
    /// Operator action; the location store is untouched.
    pub async fn purge(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM upload_queue")
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        warn!(purged, "Upload queue purged");
        Ok(purged)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
