//! # Capture Controller
//!
//! Turns sensor fixes into samples: one row in the location store and one
//! row in the upload queue.
//!
//! ```text
//!  fix ──► validate ──┬──► locations().append()  ──► LocationEvent (broadcast)
//!                     │
//!                     └──► upload_queue().enqueue() ──► nudge(Capture)
//! ```
//!
//! The two writes are independent. If one fails the other is kept and the
//! partial failure is logged; only when both fail is the call an error.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use geotrail_core::validation::validate_fix;
use geotrail_core::{Fix, Sample};
use geotrail_db::Database;

use crate::coordinator::{SyncCoordinator, SyncTrigger};
use crate::error::{SyncError, SyncResult};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_BUFFER: usize = 64;

/// Notification sent to subscribers for every stored fix.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocationEvent {
    LocationReceived { sample: Sample },
}

/// Which writes a [`CaptureController::record`] call completed.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    /// The sample as stored, with its store id when the append succeeded.
    pub sample: Sample,

    /// Row id in the location store.
    pub store_id: Option<i64>,

    /// Row id in the upload queue.
    pub queue_id: Option<i64>,

    /// Error text of the failed write, if one failed.
    pub failure: Option<String>,
}

impl CaptureReport {
    pub fn stored(&self) -> bool {
        self.store_id.is_some()
    }

    pub fn queued(&self) -> bool {
        self.queue_id.is_some()
    }

    /// True if both writes succeeded.
    pub fn is_complete(&self) -> bool {
        self.stored() && self.queued()
    }
}

/// Writes fixes to the store and queue and tells the coordinator.
#[derive(Debug, Clone)]
pub struct CaptureController {
    db: Database,
    coordinator: SyncCoordinator,
    events: broadcast::Sender<LocationEvent>,
}

impl CaptureController {
    pub fn new(db: Database, coordinator: SyncCoordinator) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        CaptureController {
            db,
            coordinator,
            events,
        }
    }

    /// Subscribes to location events.
    pub fn subscribe(&self) -> broadcast::Receiver<LocationEvent> {
        self.events.subscribe()
    }

    /// Records one fix.
    ///
    /// ## Errors
    /// - `InvalidFix` when a value is out of range; nothing is written
    /// - `Storage` when both writes fail
    pub async fn record(&self, fix: Fix) -> SyncResult<CaptureReport> {
        validate_fix(&fix).map_err(|e| SyncError::InvalidFix(e.to_string()))?;

        let sample = fix.into_sample();

        let stored = self.db.locations().append(&sample).await;
        let queued = self.db.upload_queue().enqueue(&sample).await;

        let report = match (stored, queued) {
            (Ok(store_id), Ok(queue_id)) => CaptureReport {
                sample: Sample {
                    id: Some(store_id),
                    ..sample
                },
                store_id: Some(store_id),
                queue_id: Some(queue_id),
                failure: None,
            },
            (Ok(store_id), Err(e)) => {
                warn!(
                    timestamp = sample.timestamp,
                    error = %e,
                    "Fix stored but not queued for upload"
                );
                CaptureReport {
                    sample: Sample {
                        id: Some(store_id),
                        ..sample
                    },
                    store_id: Some(store_id),
                    queue_id: None,
                    failure: Some(e.to_string()),
                }
            }
            (Err(e), Ok(queue_id)) => {
                warn!(
                    timestamp = sample.timestamp,
                    error = %e,
                    "Fix queued for upload but not stored"
                );
                CaptureReport {
                    sample,
                    store_id: None,
                    queue_id: Some(queue_id),
                    failure: Some(e.to_string()),
                }
            }
            (Err(store_err), Err(queue_err)) => {
                warn!(
                    timestamp = sample.timestamp,
                    queue_error = %queue_err,
                    error = %store_err,
                    "Fix lost, store and queue writes failed"
                );
                return Err(SyncError::Storage(store_err));
            }
        };

        debug!(
            timestamp = report.sample.timestamp,
            store_id = ?report.store_id,
            queue_id = ?report.queue_id,
            "Fix recorded"
        );

        if report.stored() {
            // No receivers is fine.
            let _ = self.events.send(LocationEvent::LocationReceived {
                sample: report.sample.clone(),
            });
        }

        if report.queued() {
            self.coordinator.nudge(SyncTrigger::Capture).await;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureConfig, ConfigHandle};
    use crate::platform::StaticConnectivity;
    use crate::uploader::Uploader;
    use geotrail_core::NetworkKind;
    use geotrail_db::DbConfig;
    use std::sync::Arc;

    async fn controller() -> (Database, CaptureController) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let coordinator = SyncCoordinator::new(
            db.clone(),
            Uploader::new().unwrap(),
            ConfigHandle::new(CaptureConfig::default()),
            Arc::new(StaticConnectivity::new(NetworkKind::Offline)),
        );
        (db.clone(), CaptureController::new(db, coordinator))
    }

    #[tokio::test]
    async fn test_record_writes_store_and_queue() {
        let (db, capture) = controller().await;

        let report = capture
            .record(Fix::new(1_700_000_000, 48.85, 2.35).with_heading(12.0))
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.sample.id, report.store_id);
        assert_eq!(db.locations().count().await.unwrap(), 1);
        assert_eq!(db.upload_queue().count().await.unwrap(), 1);

        let stored = db
            .locations()
            .get_by_id(report.store_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.heading, Some(12.0));
    }

    #[tokio::test]
    async fn test_invalid_fix_writes_nothing() {
        let (db, capture) = controller().await;

        let err = capture.record(Fix::new(1, 91.0, 0.0)).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidFix(_)));
        assert_eq!(db.locations().count().await.unwrap(), 0);
        assert_eq!(db.upload_queue().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_stored_fix() {
        let (_db, capture) = controller().await;
        let mut events = capture.subscribe();

        capture.record(Fix::new(42, 1.0, 2.0)).await.unwrap();

        let LocationEvent::LocationReceived { sample } = events.recv().await.unwrap();
        assert_eq!(sample.timestamp, 42);
        assert!(sample.id.is_some());
    }

    #[tokio::test]
    async fn test_queue_failure_keeps_store_write() {
        let (db, capture) = controller().await;
        sqlx_drop_queue(&db).await;

        let report = capture.record(Fix::new(7, 1.0, 2.0)).await.unwrap();
        assert!(report.stored());
        assert!(!report.queued());
        assert!(report.failure.is_some());
        assert_eq!(db.locations().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_both_writes_failing_is_error() {
        let (db, capture) = controller().await;
        db.close().await;

        let err = capture.record(Fix::new(7, 1.0, 2.0)).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
    }

    /// Breaks only the queue table.
    async fn sqlx_drop_queue(db: &Database) {
        use sqlx::Executor;
        db.pool().execute("DROP TABLE upload_queue").await.unwrap();
    }
}
