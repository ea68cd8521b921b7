//! # Location Store Repository
//!
//! Append-only history of every captured sample.
//!
//! ## Pagination
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Anchor-Based Forward Paging                          │
//! │                                                                         │
//! │  rows (timestamp, id):  (100,1) (200,2) (300,3) (400,4)                 │
//! │                                                                         │
//! │  query(None, 2)  → [100, 200]   next = anchor(200,2)                    │
//! │  query(a1, 2)    → [300, 400]   next = anchor(400,4)                    │
//! │  query(a2, 2)    → []           next = a2 (unchanged)                   │
//! │                                                                         │
//! │  SQL:  WHERE timestamp > ?ts OR (timestamp = ?ts AND id > ?id)          │
//! │        ORDER BY timestamp, id LIMIT ?                                   │
//! │                                                                         │
//! │  A short page means the caller has reached the end. There is no        │
//! │  separate end-of-data marker.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retention
//! `evict_older_than(days)` deletes rows with `timestamp < now - days*86400`.
//! The id high-water mark is read before the cutoff is computed, and only
//! rows at or below it are deleted. A row appended after the cutoff was
//! computed survives that call even if its own timestamp is old.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use geotrail_core::{Anchor, Sample, MAX_PAGE_SIZE, SECONDS_PER_DAY};

use super::{insert_sample, SAMPLE_COLUMNS};
use crate::error::DbResult;

const TABLE: &str = "location_store";

/// Repository for the location history table.
#[derive(Debug, Clone)]
pub struct LocationStoreRepository {
    pool: SqlitePool,
}

impl LocationStoreRepository {
    /// Creates a new LocationStoreRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LocationStoreRepository { pool }
    }

    /// Appends a sample and returns its assigned id.
    ///
    /// Any id already carried by `sample` is ignored.
    pub async fn append(&self, sample: &Sample) -> DbResult<i64> {
        let id = insert_sample(&self.pool, TABLE, sample).await?;

        debug!(id, timestamp = sample.timestamp, "Sample appended to store");
        Ok(id)
    }

    /// Appends several samples in one transaction.
    ///
    /// Either every sample is stored or none is.
    pub async fn append_all(&self, samples: &[Sample]) -> DbResult<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(samples.len());

        for sample in samples {
            ids.push(insert_sample(&mut *tx, TABLE, sample).await?);
        }

        tx.commit().await?;

        debug!(count = ids.len(), "Samples appended to store");
        Ok(ids)
    }

    /// Returns up to `limit` samples strictly after `anchor`.
    ///
    /// ## Arguments
    /// * `anchor` - Position to continue from, `None` for the beginning
    /// * `limit` - Page size. Pages above [`MAX_PAGE_SIZE`] are read in
    ///   several statements, so a page is short only at the end of the data.
    ///
    /// ## Returns
    /// The page in ascending (timestamp, id) order and the anchor of its last
    /// row. An empty page returns the input anchor unchanged.
    pub async fn query(
        &self,
        anchor: Option<Anchor>,
        limit: u32,
    ) -> DbResult<(Vec<Sample>, Option<Anchor>)> {
        if limit == 0 {
            return Ok((Vec::new(), anchor));
        }

        // Ids start at 1, so (MIN, MIN) sorts before every row.
        let mut after = anchor.unwrap_or(Anchor::new(i64::MIN, i64::MIN));

        let sql = format!(
            "SELECT {SAMPLE_COLUMNS} FROM {TABLE} \
             WHERE timestamp > ?1 OR (timestamp = ?1 AND id > ?2) \
             ORDER BY timestamp ASC, id ASC \
             LIMIT ?3"
        );

        let mut samples: Vec<Sample> = Vec::new();
        let mut remaining = limit;

        while remaining > 0 {
            let chunk = remaining.min(MAX_PAGE_SIZE);
            let rows: Vec<Sample> = sqlx::query_as(&sql)
                .bind(after.timestamp)
                .bind(after.id)
                .bind(i64::from(chunk))
                .fetch_all(&self.pool)
                .await?;

            let fetched = rows.len();
            let Some(last) = rows.last().and_then(Sample::anchor) else {
                break;
            };
            after = last;
            samples.extend(rows);

            if fetched < chunk as usize {
                break;
            }
            remaining -= chunk;
        }

        let next = samples.last().and_then(Sample::anchor).or(anchor);

        debug!(
            returned = samples.len(),
            limit,
            "Location store page read"
        );

        Ok((samples, next))
    }

    /// Returns the anchor of the newest row in (timestamp, id) order.
    ///
    /// Querying from this anchor yields only samples captured afterwards.
    /// `None` when the store is empty.
    pub async fn latest_anchor(&self) -> DbResult<Option<Anchor>> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT timestamp, id FROM location_store ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(timestamp, id)| Anchor::new(timestamp, id)))
    }

    /// Gets a sample by its store id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Sample>> {
        let sql = format!("SELECT {SAMPLE_COLUMNS} FROM {TABLE} WHERE id = ?1");

        let sample = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sample)
    }

    /// Counts stored samples.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM location_store")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Deletes samples older than `days` days before the current time.
    ///
    /// ## Returns
    /// Number of deleted rows. Running it twice deletes nothing the second
    /// time.
    pub async fn evict_older_than(&self, days: u32) -> DbResult<u64> {
        let high_water = self.high_water().await?;
        let cutoff = cutoff_for(days, Utc::now().timestamp());
        self.delete_before(cutoff, high_water).await
    }

    /// Same as [`evict_older_than`](Self::evict_older_than) with an explicit
    /// clock, in epoch seconds.
    pub async fn evict_older_than_at(&self, days: u32, now: i64) -> DbResult<u64> {
        let high_water = self.high_water().await?;
        self.delete_before(cutoff_for(days, now), high_water).await
    }

    /// Deletes samples with `timestamp < cutoff` that existed when the call
    /// started.
    pub async fn evict_before(&self, cutoff: i64) -> DbResult<u64> {
        let high_water = self.high_water().await?;
        self.delete_before(cutoff, high_water).await
    }

    /// Largest id assigned so far, 0 for an empty table.
    async fn high_water(&self) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM location_store")
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }

    async fn delete_before(&self, cutoff: i64, high_water: i64) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM location_store WHERE timestamp < ?1 AND id <= ?2")
            .bind(cutoff)
            .bind(high_water)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!(deleted, cutoff, "Evicted old samples from store");
        }

        Ok(deleted)
    }
}

fn cutoff_for(days: u32, now: i64) -> i64 {
    now.saturating_sub(i64::from(days).saturating_mul(SECONDS_PER_DAY))
}

// =============================================================================
// Unit Tests
// =============================================================================
