//! # geotrail-sync: Capture, Upload and Sync Engine
//!
//! Records location fixes and delivers queued samples to an HTTP endpoint,
//! surviving failed uploads, restarts and shutdown mid-delivery.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         LocationCapture (facade)                        │
//! │                                                                         │
//! │   LocationSensor ──► CaptureController ──┬──► location_store           │
//! │   (host trait)        validate + write   └──► upload_queue             │
//! │                             │                      │                    │
//! │                             │ nudge(Capture)       │ flush / restore    │
//! │                             ▼                      ▼                    │
//! │   Connectivity ────► SyncCoordinator ─────► Uploader ──► POST endpoint │
//! │   (host trait)        gates, timer,          JSON or form body          │
//! │                       cancellation           2xx = delivered            │
//! │                                                                         │
//! │   ConfigHandle: Arc<CaptureConfig> snapshots in a watch channel        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery Guarantee
//! A queued sample is removed for good only after the endpoint answers 2xx.
//! Between `flush` and that answer the batch lives in the coordinator's
//! memory; every other path (failure, timeout, shutdown) restores it.
//! A server that accepted a batch but whose answer was lost will see it again.
//!
//! ## Module Organization
//! - [`capture`] - `CaptureController`, `LocationEvent`
//! - [`config`] - `CaptureConfig`, `ConfigPatch`, `ConfigHandle`
//! - [`coordinator`] - `SyncCoordinator` cycle and background loop
//! - [`error`] - Sync error types
//! - [`facade`] - `LocationCapture`, the host entry point
//! - [`platform`] - Sensor and connectivity traits
//! - [`uploader`] - Body encoding and HTTP delivery

pub mod capture;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod facade;
pub mod platform;
pub mod uploader;

// =============================================================================
// Re-exports
// =============================================================================

pub use capture::{CaptureController, CaptureReport, LocationEvent};
pub use config::{CaptureConfig, ConfigHandle, ConfigPatch};
pub use coordinator::{
    CycleOutcome, SkipReason, SyncCoordinator, SyncPhase, SyncStatus, SyncTrigger,
};
pub use error::{SyncError, SyncResult};
pub use facade::LocationCapture;
pub use platform::{Connectivity, LocationSensor, SensorError, StaticConnectivity};
pub use uploader::{UploadRequest, Uploader};
