//! # LocationCapture
//!
//! The single object a host bridge talks to. Owns the database, the
//! configuration snapshot, the capture controller and the sync coordinator.
//!
//! ## Host Operations
//! ```text
//! ┌───────────────────┬──────────────────────────────────────────────────────┐
//! │ capture_now()     │ one-shot fix from the sensor, recorded like any fix  │
//! │ record(fix)       │ store + queue a fix pushed by the host               │
//! │ configure(patch)  │ merge options; all-or-nothing                        │
//! │ start() / stop()  │ sensor updates + background sync loop; idempotent    │
//! │ query(anchor, n)  │ forward page over the location store                 │
//! │ latest_anchor()   │ anchor after which only new samples appear           │
//! │ sync_now()        │ one cycle, ignoring upload_frequency                 │
//! │ status()          │ phase, last outcome, pending count                   │
//! │ subscribe()       │ LocationEvent stream                                 │
//! └───────────────────┴──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use geotrail_core::{Anchor, QueryPage, Sample};
use geotrail_db::{Database, DbConfig};

use crate::capture::{CaptureController, CaptureReport, LocationEvent};
use crate::config::{CaptureConfig, ConfigHandle, ConfigPatch};
use crate::coordinator::{CycleOutcome, SyncCoordinator, SyncStatus, SyncTrigger};
use crate::error::{SyncError, SyncResult};
use crate::platform::{Connectivity, LocationSensor};
use crate::uploader::Uploader;

const IN_MEMORY: &str = ":memory:";

/// Host-facing entry point.
pub struct LocationCapture {
    db: Database,
    config: ConfigHandle,
    sensor: Arc<dyn LocationSensor>,
    coordinator: SyncCoordinator,
    capture: CaptureController,
}

impl LocationCapture {
    /// Opens the database named by `config` and wires everything up.
    ///
    /// The background sync loop is not started; call [`start`](Self::start).
    pub async fn open(
        config: CaptureConfig,
        sensor: Arc<dyn LocationSensor>,
        connectivity: Arc<dyn Connectivity>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let path = config.resolved_database_path()?;
        let db_config = if path.as_os_str() == IN_MEMORY {
            DbConfig::in_memory()
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SyncError::InvalidConfig(format!(
                        "Cannot create data directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            DbConfig::new(path)
        };

        let db = Database::new(db_config).await?;
        Self::with_database(db, config, sensor, connectivity)
    }

    /// Opens with configuration read from a TOML file and the environment.
    ///
    /// `None` reads `capture.toml` from the platform config directory. A
    /// missing file means defaults; an unreadable or invalid one is an error.
    pub async fn open_from_file(
        config_path: Option<PathBuf>,
        sensor: Arc<dyn LocationSensor>,
        connectivity: Arc<dyn Connectivity>,
    ) -> SyncResult<Self> {
        let config = CaptureConfig::load(config_path)?;
        Self::open(config, sensor, connectivity).await
    }

    /// Wires up an already opened database.
    pub fn with_database(
        db: Database,
        config: CaptureConfig,
        sensor: Arc<dyn LocationSensor>,
        connectivity: Arc<dyn Connectivity>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let config = ConfigHandle::new(config);
        let coordinator =
            SyncCoordinator::new(db.clone(), Uploader::new()?, config.clone(), connectivity);
        let capture = CaptureController::new(db.clone(), coordinator.clone());

        Ok(LocationCapture {
            db,
            config,
            sensor,
            coordinator,
            capture,
        })
    }

    // =========================================================================
    // Capture
    // =========================================================================

    /// Requests one fix from the sensor and records it.
    ///
    /// Sensor failures are returned as-is and nothing is written.
    pub async fn capture_now(&self) -> SyncResult<Sample> {
        let fix = self.sensor.current_fix().await?;
        let report = self.capture.record(fix).await?;
        Ok(report.sample)
    }

    /// Records a fix delivered by the host's own location updates.
    pub async fn record(&self, fix: geotrail_core::Fix) -> SyncResult<CaptureReport> {
        self.capture.record(fix).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocationEvent> {
        self.capture.subscribe()
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Merges `patch` into the current configuration.
    pub fn configure(&self, patch: &ConfigPatch) -> SyncResult<Arc<CaptureConfig>> {
        self.config.configure(patch)
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<CaptureConfig> {
        self.config.snapshot()
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Starts sensor updates with the configured filters, then the
    /// background sync loop.
    ///
    /// A sensor that refuses to start leaves the loop stopped.
    pub async fn start(&self) -> SyncResult<()> {
        let config = self.config.snapshot();
        self.sensor
            .start_updates(config.time_filter, config.distance_filter)
            .await?;
        self.coordinator.start().await;
        Ok(())
    }

    pub async fn stop(&self) {
        self.sensor.stop_updates().await;
        self.coordinator.stop().await;
    }

    /// Runs one sync cycle now.
    pub async fn sync_now(&self) -> SyncResult<CycleOutcome> {
        self.coordinator.run_cycle(SyncTrigger::Manual).await
    }

    pub async fn status(&self) -> SyncStatus {
        self.coordinator.status().await
    }

    /// Deletes everything waiting for upload. Returns the number removed.
    pub async fn purge_queue(&self) -> SyncResult<u64> {
        Ok(self.db.upload_queue().purge().await?)
    }

    // =========================================================================
    // Store Reads
    // =========================================================================

    /// Reads the page after `anchor`. `None` or `""` starts at the beginning.
    pub async fn query(&self, anchor: Option<&str>, limit: u32) -> SyncResult<QueryPage> {
        let after = Anchor::decode_optional(anchor)?;
        let (samples, next) = self.db.locations().query(after, limit).await?;

        debug!(returned = samples.len(), limit, "Query page served");

        Ok(QueryPage {
            samples,
            next_anchor: next.map(|a| a.encode()),
        })
    }

    /// Anchor of the newest stored sample, `None` when the store is empty.
    pub async fn latest_anchor(&self) -> SyncResult<Option<String>> {
        let anchor = self.db.locations().latest_anchor().await?;
        Ok(anchor.map(|a| a.encode()))
    }

    /// Stops syncing and closes the database.
    pub async fn close(self) {
        self.stop().await;
        self.db.close().await;
        info!("Location capture closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{SensorError, StaticConnectivity};
    use async_trait::async_trait;
    use geotrail_core::{Fix, NetworkKind};

    use std::sync::Mutex;

    struct FixedSensor {
        fix: Result<Fix, SensorError>,
        updates: Mutex<Option<(u32, u32)>>,
    }

    impl FixedSensor {
        fn new(fix: Result<Fix, SensorError>) -> Self {
            FixedSensor {
                fix,
                updates: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LocationSensor for FixedSensor {
        async fn current_fix(&self) -> Result<Fix, SensorError> {
            self.fix.clone()
        }

        async fn start_updates(
            &self,
            time_filter: u32,
            distance_filter: u32,
        ) -> Result<(), SensorError> {
            if let Err(SensorError::PermissionDenied) = self.fix {
                return Err(SensorError::PermissionDenied);
            }
            *self.updates.lock().unwrap() = Some((time_filter, distance_filter));
            Ok(())
        }

        async fn stop_updates(&self) {
            *self.updates.lock().unwrap() = None;
        }
    }

    fn in_memory_config() -> CaptureConfig {
        CaptureConfig {
            database_path: Some(IN_MEMORY.into()),
            ..CaptureConfig::default()
        }
    }

    async fn open(sensor: Result<Fix, SensorError>) -> LocationCapture {
        LocationCapture::open(
            in_memory_config(),
            Arc::new(FixedSensor::new(sensor)),
            Arc::new(StaticConnectivity::new(NetworkKind::Wifi)),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_capture_now_records_sensor_fix() {
        let capture = open(Ok(Fix::new(500, 10.0, 20.0))).await;

        let sample = capture.capture_now().await.unwrap();
        assert_eq!(sample.timestamp, 500);
        assert!(sample.id.is_some());

        let page = capture.query(None, 10).await.unwrap();
        assert_eq!(page.samples, vec![sample]);
    }

    #[tokio::test]
    async fn test_capture_now_forwards_sensor_errors() {
        let capture = open(Err(SensorError::PermissionDenied)).await;
        let err = capture.capture_now().await.unwrap_err();
        assert!(matches!(err, SyncError::PermissionDenied));

        let capture = open(Err(SensorError::Unavailable("gps off".into()))).await;
        let err = capture.capture_now().await.unwrap_err();
        assert!(matches!(err, SyncError::SensorUnavailable(_)));

        assert!(capture.query(None, 10).await.unwrap().samples.is_empty());
        assert_eq!(capture.status().await.pending_count, 0);
    }

    #[tokio::test]
    async fn test_query_pages_with_string_anchors() {
        let capture = open(Ok(Fix::new(0, 0.0, 0.0))).await;
        for ts in [100, 200, 300] {
            capture.record(Fix::new(ts, 0.0, 0.0)).await.unwrap();
        }

        let first = capture.query(Some(""), 2).await.unwrap();
        assert_eq!(first.samples.len(), 2);

        let second = capture
            .query(first.next_anchor.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(second.samples.len(), 1);
        assert_eq!(second.samples[0].timestamp, 300);

        let done = capture
            .query(second.next_anchor.as_deref(), 2)
            .await
            .unwrap();
        assert!(done.samples.is_empty());
        assert_eq!(done.next_anchor, second.next_anchor);
    }

    #[tokio::test]
    async fn test_query_rejects_garbage_anchor() {
        let capture = open(Ok(Fix::new(0, 0.0, 0.0))).await;
        let err = capture.query(Some("not an anchor"), 5).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidAnchor(_)));
    }

    #[tokio::test]
    async fn test_latest_anchor_skips_history() {
        let capture = open(Ok(Fix::new(0, 0.0, 0.0))).await;
        assert_eq!(capture.latest_anchor().await.unwrap(), None);

        capture.record(Fix::new(100, 0.0, 0.0)).await.unwrap();
        let latest = capture.latest_anchor().await.unwrap();
        capture.record(Fix::new(150, 0.0, 0.0)).await.unwrap();

        let page = capture.query(latest.as_deref(), 10).await.unwrap();
        let ts: Vec<i64> = page.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![150]);
    }

    #[tokio::test]
    async fn test_configure_is_all_or_nothing() {
        let capture = open(Ok(Fix::new(0, 0.0, 0.0))).await;

        let err = capture
            .configure(&ConfigPatch {
                upload_frequency: Some(60),
                upload_request_format: Some("XML".into()),
                ..ConfigPatch::default()
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedFormat(_)));
        assert_eq!(capture.config().upload_frequency, 0);
    }

    #[tokio::test]
    async fn test_sync_now_disabled_by_default() {
        let capture = open(Ok(Fix::new(0, 0.0, 0.0))).await;
        capture.capture_now().await.unwrap();

        let outcome = capture.sync_now().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Skipped(_)));
        assert_eq!(capture.status().await.pending_count, 1);

        assert_eq!(capture.purge_queue().await.unwrap(), 1);
        assert_eq!(capture.status().await.pending_count, 0);
    }

    #[tokio::test]
    async fn test_start_passes_filters_to_sensor() {
        let sensor = Arc::new(FixedSensor::new(Ok(Fix::new(0, 0.0, 0.0))));
        let capture = LocationCapture::open(
            in_memory_config(),
            sensor.clone(),
            Arc::new(StaticConnectivity::new(NetworkKind::Wifi)),
        )
        .await
        .unwrap();
        capture
            .configure(&ConfigPatch {
                time_filter: Some(10),
                distance_filter: Some(25),
                ..ConfigPatch::default()
            })
            .unwrap();

        capture.start().await.unwrap();
        assert_eq!(*sensor.updates.lock().unwrap(), Some((10, 25)));
        assert!(capture.status().await.running);

        capture.stop().await;
        assert_eq!(*sensor.updates.lock().unwrap(), None);
        assert!(!capture.status().await.running);
    }

    #[tokio::test]
    async fn test_start_fails_when_sensor_refuses() {
        let capture = open(Err(SensorError::PermissionDenied)).await;
        let err = capture.start().await.unwrap_err();
        assert!(matches!(err, SyncError::PermissionDenied));
        assert!(!capture.status().await.running);
    }

    #[tokio::test]
    async fn test_open_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("db").join("geotrail.db");
        let config_path = dir.path().join("capture.toml");
        std::fs::write(
            &config_path,
            format!(
                "keep_locations_for = 9\ndatabase_path = {:?}\n",
                db_path.display().to_string()
            ),
        )
        .unwrap();

        let capture = LocationCapture::open_from_file(
            Some(config_path),
            Arc::new(FixedSensor::new(Ok(Fix::new(500, 1.0, 2.0)))),
            Arc::new(StaticConnectivity::new(NetworkKind::Wifi)),
        )
        .await
        .unwrap();
        assert_eq!(capture.config().keep_locations_for, 9);

        capture.capture_now().await.unwrap();
        capture.close().await;
        assert!(db_path.exists());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "upload_fields = [\"altitude\"]").unwrap();
        let err = LocationCapture::open_from_file(
            Some(bad),
            Arc::new(FixedSensor::new(Ok(Fix::new(0, 0.0, 0.0)))),
            Arc::new(StaticConnectivity::new(NetworkKind::Wifi)),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, SyncError::UnknownField(_)));
    }
}
