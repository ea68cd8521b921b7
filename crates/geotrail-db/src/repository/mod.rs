//! # Repository Module
//!
//! Table-level access for Geotrail's two durable tables.
//!
//! ## Two Tables, Two Key Spaces
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Fix, Two Rows                                    │
//! │                                                                         │
//! │  CaptureController::record(fix)                                        │
//! │       │                                                                 │
//! │       ├──────────────────────────┐                                      │
//! │       ▼                          ▼                                      │
//! │  LocationStoreRepository    UploadQueueRepository                      │
//! │  ├── append                 ├── enqueue                                │
//! │  ├── query(anchor, limit)   ├── flush   (delete + return, atomic)      │
//! │  ├── latest_anchor          ├── restore (re-insert, one transaction)   │
//! │  └── evict_older_than       └── purge                                  │
//! │       │                          │                                      │
//! │       ▼                          ▼                                      │
//! │  location_store             upload_queue                               │
//! │  (history, paginated)       (pending delivery)                         │
//! │                                                                         │
//! │  Retention eviction only touches location_store, so an old sample      │
//! │  that was never delivered stays in upload_queue.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`LocationStoreRepository`](location::LocationStoreRepository) - History append, pagination, eviction
//! - [`UploadQueueRepository`](queue::UploadQueueRepository) - Pending delivery queue

pub mod location;
pub mod queue;

use geotrail_core::Sample;
use sqlx::SqliteExecutor;

use crate::error::DbResult;

/// Column list shared by both tables, in `Sample` field order.
pub(crate) const SAMPLE_COLUMNS: &str = "id, timestamp, latitude, longitude, accuracy, heading, speed";

/// Inserts one sample into `table`, ignoring any id it carries.
///
/// Returns the new row id.
pub(crate) async fn insert_sample<'e, E>(executor: E, table: &str, sample: &Sample) -> DbResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "INSERT INTO {table} (timestamp, latitude, longitude, accuracy, heading, speed) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
    );

    let result = sqlx::query(&sql)
        .bind(sample.timestamp)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(sample.accuracy)
        .bind(sample.heading)
        .bind(sample.speed)
        .execute(executor)
        .await?;

    Ok(result.last_insert_rowid())
}
