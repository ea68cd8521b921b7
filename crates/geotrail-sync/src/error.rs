//! # Sync Error Types
//!
//! Error types for capture, configuration and sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Storage      │  │     Sensor              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Storage(DbErr) │  │  SensorUnavailable      │ │
//! │  │  UnknownField   │  │                 │  │  PermissionDenied       │ │
//! │  │  UnsupportedFmt │  │                 │  │                         │ │
//! │  │  InvalidUrl     │  │                 │  │  InvalidFix             │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Delivery failure is NOT an error: `Uploader::upload` returns           │
//! │  `Ok(false)` and the batch goes back to the queue.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use geotrail_core::{CoreError, ValidationError};
use geotrail_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering every failure reported to the host.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid capture configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An upload field name that no sample carries.
    #[error("Unknown upload field: '{0}'")]
    UnknownField(String),

    /// A request format other than JSON or FORM_URL_ENCODED.
    #[error("Unsupported request format: '{0}'")]
    UnsupportedFormat(String),

    /// Upload URL missing, malformed, or not http(s).
    #[error("Invalid upload URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// A pagination anchor the store never issued.
    #[error("Invalid anchor: {0}")]
    InvalidAnchor(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Location store or upload queue failure.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    // =========================================================================
    // Sensor Errors
    // =========================================================================
    /// No fix could be obtained.
    #[error("Location sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// The user or platform refused location access.
    #[error("Location permission denied")]
    PermissionDenied,

    /// A fix with out-of-range values.
    #[error("Invalid fix: {0}")]
    InvalidFix(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::NotAllowed { field, value, .. } if field == "upload_fields" => {
                SyncError::UnknownField(value)
            }
            ValidationError::NotAllowed { field, value, .. }
                if field == "upload_request_format" =>
            {
                SyncError::UnsupportedFormat(value)
            }
            other => SyncError::InvalidConfig(other.to_string()),
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAnchor { anchor, reason } => {
                SyncError::InvalidAnchor(format!("'{anchor}': {reason}"))
            }
            CoreError::Validation(v) => v.into(),
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if a later attempt may succeed without any change by the
    /// caller.
    ///
    /// Storage contention and transient I/O are retryable. Corruption, a full
    /// disk, and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Storage(db) => matches!(
                db,
                DbError::PoolExhausted | DbError::ConnectionFailed(_) | DbError::QueryFailed(_)
            ),
            SyncError::SensorUnavailable(_) => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::UnknownField(_)
                | SyncError::UnsupportedFormat(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
