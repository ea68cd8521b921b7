//! # Platform Collaborators
//!
//! Interfaces to device facilities the core does not own: the location
//! sensor and the network reachability check. Hosts supply implementations;
//! tests use fakes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

use geotrail_core::{Fix, NetworkKind};

use crate::error::SyncError;

// =============================================================================
// Location Sensor
// =============================================================================

/// Why a one-shot fix could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    /// No provider is available (e.g. GPS switched off).
    #[error("no location provider: {0}")]
    Unavailable(String),

    /// Location access was refused.
    #[error("permission denied")]
    PermissionDenied,

    /// The provider exists but is out of service.
    #[error("provider out of service")]
    OutOfService,

    /// The provider is temporarily unable to deliver a fix.
    #[error("provider temporarily unavailable")]
    TemporarilyUnavailable,
}

impl From<SensorError> for SyncError {
    fn from(err: SensorError) -> Self {
        match err {
            SensorError::PermissionDenied => SyncError::PermissionDenied,
            other => SyncError::SensorUnavailable(other.to_string()),
        }
    }
}

/// Source of location fixes.
#[async_trait]
pub trait LocationSensor: Send + Sync {
    /// Requests a single fix now.
    async fn current_fix(&self) -> Result<Fix, SensorError>;

    /// Begins continuous updates, at most one every `time_filter` seconds
    /// and only after moving `distance_filter` metres. Zero disables a filter.
    ///
    /// Hosts that push fixes through `record` themselves can keep the default.
    async fn start_updates(
        &self,
        _time_filter: u32,
        _distance_filter: u32,
    ) -> Result<(), SensorError> {
        Ok(())
    }

    /// Ends continuous updates.
    async fn stop_updates(&self) {}
}

// =============================================================================
// Connectivity
// =============================================================================

/// Reports which network path is currently usable.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn current_network(&self) -> NetworkKind;
}

/// Connectivity that reports whatever the host last set.
///
/// For hosts that receive reachability callbacks rather than polling.
#[derive(Debug, Default)]
pub struct StaticConnectivity {
    kind: AtomicU8,
}

impl StaticConnectivity {
    pub fn new(kind: NetworkKind) -> Self {
        StaticConnectivity {
            kind: AtomicU8::new(encode(kind)),
        }
    }

    /// Records a reachability change.
    pub fn set(&self, kind: NetworkKind) {
        self.kind.store(encode(kind), Ordering::SeqCst);
    }

    pub fn get(&self) -> NetworkKind {
        decode(self.kind.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Connectivity for StaticConnectivity {
    async fn current_network(&self) -> NetworkKind {
        self.get()
    }
}

fn encode(kind: NetworkKind) -> u8 {
    match kind {
        NetworkKind::Offline => 0,
        NetworkKind::Wifi => 1,
        NetworkKind::Cellular => 2,
        NetworkKind::Other => 3,
    }
}

fn decode(raw: u8) -> NetworkKind {
    match raw {
        1 => NetworkKind::Wifi,
        2 => NetworkKind::Cellular,
        3 => NetworkKind::Other,
        _ => NetworkKind::Offline,
    }
}
