//! # Capture Configuration
//!
//! Options that control capture, upload and retention.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. configure(patch) from the host (highest priority, at runtime)      │
//! │     Only the options present in the patch change.                      │
//! │                                                                         │
//! │  2. Environment Variables                                              │
//! │     GEOTRAIL_UPLOAD_URL=https://example.com/track                      │
//! │     GEOTRAIL_UPLOAD_ENABLED=true                                       │
//! │     GEOTRAIL_UPLOAD_FREQUENCY=300                                      │
//! │     GEOTRAIL_KEEP_LOCATIONS_FOR=14                                     │
//! │                                                                         │
//! │  3. TOML Config File                                                   │
//! │     ~/.config/geotrail/capture.toml (Linux)                            │
//! │     ~/Library/Application Support/dev.geotrail.geotrail/... (macOS)    │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! │     uploads disabled, 30 s time filter, 30 day retention               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # capture.toml
//! time_filter = 30
//! distance_filter = 0
//! upload_enabled = true
//! upload_url = "https://example.com/track"
//! upload_connection_type = "WIFI+CELLULAR"
//! upload_frequency = 300
//! upload_request_format = "JSON"
//! upload_locations_param = "locations"
//! upload_fields = ["timestamp", "latitude", "longitude"]
//! keep_locations_for = 30
//!
//! [upload_extra_params]
//! device = "phone-7"
//! ```
//!
//! ## Snapshots
//! The live configuration is an immutable `Arc<CaptureConfig>` held by a
//! [`ConfigHandle`]. `configure` builds and validates a complete new snapshot
//! before swapping it in, so a rejected patch changes nothing and a running
//! upload keeps the snapshot it started with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use geotrail_core::validation::{parse_upload_fields, validate_locations_param};
use geotrail_core::{ConnectionType, RequestFormat, UploadField};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Capture Configuration
// =============================================================================

/// Complete capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum seconds between fixes requested from the sensor.
    pub time_filter: u32,

    /// Minimum meters between fixes requested from the sensor.
    pub distance_filter: u32,

    /// Master switch for uploads.
    pub upload_enabled: bool,

    /// Endpoint that receives batches. Required when uploads are enabled.
    pub upload_url: Option<String>,

    /// Which networks uploads may use.
    pub upload_connection_type: ConnectionType,

    /// Minimum seconds between automatic sync cycles. 0 = no gate.
    pub upload_frequency: u64,

    /// Body encoding.
    pub upload_request_format: RequestFormat,

    /// Top-level parameter that holds the sample array.
    pub upload_locations_param: String,

    /// Sample fields to send, in order.
    ///
    /// Kept as names so an unknown one is reported when an upload is built.
    pub upload_fields: Vec<String>,

    /// Days of history kept in the location store.
    pub keep_locations_for: u32,

    /// Upper bound on one upload request, seconds.
    pub upload_timeout_secs: u64,

    /// SQLite file. `None` uses the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Additional top-level parameters sent with every batch.
    ///
    /// Last so it serializes as a trailing TOML table.
    pub upload_extra_params: BTreeMap<String, String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            time_filter: 30,
            distance_filter: 0,
            upload_enabled: false,
            upload_url: None,
            upload_connection_type: ConnectionType::WifiAndCellular,
            upload_frequency: 0,
            upload_request_format: RequestFormat::Json,
            upload_locations_param: "locations".to_string(),
            upload_extra_params: BTreeMap::new(),
            upload_fields: vec![
                UploadField::Timestamp.to_string(),
                UploadField::Latitude.to_string(),
                UploadField::Longitude.to_string(),
            ],
            keep_locations_for: 30,
            upload_timeout_secs: 30,
            database_path: None,
        }
    }
}

impl CaptureConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (capture.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with environment lookups routed through `lookup`.
    fn load_with(
        config_path: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading capture config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides_from(lookup);
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Capture config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.upload_enabled {
            let raw = self
                .upload_url
                .as_deref()
                .ok_or_else(|| SyncError::InvalidUrl("upload_url is required when uploads are enabled".into()))?;
            let parsed = url::Url::parse(raw)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "Upload URL must use http:// or https://, got: {}",
                    raw
                )));
            }
        }

        parse_upload_fields(&self.upload_fields)?;
        validate_locations_param(&self.upload_locations_param)?;

        if self.upload_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "upload_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Returns a copy with `patch` applied.
    ///
    /// Options absent from the patch keep their current values. The result
    /// is validated; on error `self` is the configuration still in force.
    pub fn merged(&self, patch: &ConfigPatch) -> SyncResult<Self> {
        let mut next = self.clone();

        if let Some(v) = patch.time_filter {
            next.time_filter = v;
        }
        if let Some(v) = patch.distance_filter {
            next.distance_filter = v;
        }
        if let Some(v) = patch.upload_enabled {
            next.upload_enabled = v;
        }
        if let Some(ref v) = patch.upload_url {
            next.upload_url = Some(v.clone());
        }
        if let Some(ref v) = patch.upload_connection_type {
            next.upload_connection_type = v.parse()?;
        }
        if let Some(v) = patch.upload_frequency {
            next.upload_frequency = v;
        }
        if let Some(ref v) = patch.upload_request_format {
            next.upload_request_format = v.parse()?;
        }
        if let Some(ref v) = patch.upload_locations_param {
            next.upload_locations_param = v.clone();
        }
        if let Some(ref v) = patch.upload_extra_params {
            next.upload_extra_params = v.clone();
        }
        if let Some(ref v) = patch.upload_fields {
            next.upload_fields = v.clone();
        }
        if let Some(v) = patch.keep_locations_for {
            next.keep_locations_for = v;
        }
        if let Some(v) = patch.upload_timeout_secs {
            next.upload_timeout_secs = v;
        }

        next.validate()?;
        Ok(next)
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("GEOTRAIL_UPLOAD_URL") {
            debug!(url = %url, "Overriding upload URL from environment");
            self.upload_url = Some(url);
        }

        if let Some(enabled) = lookup("GEOTRAIL_UPLOAD_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.upload_enabled = true,
                "0" | "false" | "no" => self.upload_enabled = false,
                _ => warn!(value = %enabled, "Unrecognised GEOTRAIL_UPLOAD_ENABLED"),
            }
        }

        if let Some(freq) = lookup("GEOTRAIL_UPLOAD_FREQUENCY") {
            if let Ok(secs) = freq.parse::<u64>() {
                debug!(secs, "Overriding upload frequency from environment");
                self.upload_frequency = secs;
            }
        }

        if let Some(days) = lookup("GEOTRAIL_KEEP_LOCATIONS_FOR") {
            if let Ok(d) = days.parse::<u32>() {
                self.keep_locations_for = d;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "geotrail", "geotrail")
            .map(|dirs| dirs.config_dir().join("capture.toml"))
    }

    /// Returns the database file to open: `database_path` if set, otherwise
    /// `geotrail.db` in the platform data directory.
    pub fn resolved_database_path(&self) -> SyncResult<PathBuf> {
        if let Some(ref path) = self.database_path {
            return Ok(path.clone());
        }

        directories::ProjectDirs::from("dev", "geotrail", "geotrail")
            .map(|dirs| dirs.data_dir().join("geotrail.db"))
            .ok_or_else(|| SyncError::InvalidConfig("No data directory available".into()))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the upload request timeout.
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Returns the minimum spacing between automatic sync cycles.
    pub fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.upload_frequency)
    }
}

// =============================================================================
// Config Patch
// =============================================================================

/// A partial update from the host. Every option is optional.
///
/// Enum-valued options arrive as their wire names and are parsed during the
/// merge, so an unknown value fails the whole `configure` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub time_filter: Option<u32>,
    pub distance_filter: Option<u32>,
    pub upload_enabled: Option<bool>,
    pub upload_url: Option<String>,
    pub upload_connection_type: Option<String>,
    pub upload_frequency: Option<u64>,
    pub upload_request_format: Option<String>,
    pub upload_locations_param: Option<String>,
    pub upload_extra_params: Option<BTreeMap<String, String>>,
    pub upload_fields: Option<Vec<String>>,
    pub keep_locations_for: Option<u32>,
    pub upload_timeout_secs: Option<u64>,
}

// =============================================================================
// Config Handle
// =============================================================================

/// Shared, swappable configuration snapshot.
///
/// Cloning the handle shares the same underlying snapshot.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<CaptureConfig>>>,
}

impl ConfigHandle {
    /// Creates a handle holding `config`.
    pub fn new(config: CaptureConfig) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        ConfigHandle { tx: Arc::new(tx) }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<CaptureConfig> {
        self.tx.borrow().clone()
    }

    /// Merges `patch` into the current configuration.
    ///
    /// Fails without any effect if the merged configuration is invalid.
    pub fn configure(&self, patch: &ConfigPatch) -> SyncResult<Arc<CaptureConfig>> {
        let mut outcome = Ok(());

        self.tx.send_if_modified(|current| match current.merged(patch) {
            Ok(next) => {
                let changed = next != **current;
                *current = Arc::new(next);
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });

        outcome?;
        let snapshot = self.snapshot();
        info!(
            upload_enabled = snapshot.upload_enabled,
            upload_frequency = snapshot.upload_frequency,
            format = %snapshot.upload_request_format,
            "Capture configuration updated"
        );
        Ok(snapshot)
    }

    /// Subscribes to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CaptureConfig>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn enabled() -> CaptureConfig {
        CaptureConfig {
            upload_enabled: true,
            upload_url: Some("https://example.com/track".into()),
            ..CaptureConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert_eq!(config.time_filter, 30);
        assert_eq!(config.distance_filter, 0);
        assert!(!config.upload_enabled);
        assert_eq!(config.upload_connection_type, ConnectionType::WifiAndCellular);
        assert_eq!(config.upload_frequency, 0);
        assert_eq!(config.upload_request_format, RequestFormat::Json);
        assert_eq!(config.upload_locations_param, "locations");
        assert!(config.upload_extra_params.is_empty());
        assert_eq!(config.upload_fields, vec!["timestamp", "latitude", "longitude"]);
        assert_eq!(config.keep_locations_for, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = enabled();
        assert!(config.validate().is_ok());

        config.upload_url = None;
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.upload_url = Some("ftp://example.com".into());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.upload_url = Some("not a url".into());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        let mut config = enabled();
        config.upload_fields = vec!["timestamp".into(), "altitude".into()];
        assert!(matches!(config.validate(), Err(SyncError::UnknownField(_))));

        let mut config = enabled();
        config.upload_timeout_secs = 0;
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_merge_keeps_unspecified_options() {
        let base = enabled();
        let patch = ConfigPatch {
            upload_frequency: Some(600),
            upload_request_format: Some("form_url_encoded".into()),
            ..ConfigPatch::default()
        };

        let merged = base.merged(&patch).unwrap();
        assert_eq!(merged.upload_frequency, 600);
        assert_eq!(merged.upload_request_format, RequestFormat::FormUrlEncoded);
        assert_eq!(merged.upload_url, base.upload_url);
        assert_eq!(merged.upload_fields, base.upload_fields);
        assert_eq!(merged.keep_locations_for, base.keep_locations_for);
    }

    #[test]
    fn test_merge_rejects_bad_values() {
        let base = CaptureConfig::default();

        let bad_format = ConfigPatch {
            upload_request_format: Some("XML".into()),
            ..ConfigPatch::default()
        };
        assert!(matches!(
            base.merged(&bad_format),
            Err(SyncError::UnsupportedFormat(_))
        ));

        let bad_connection = ConfigPatch {
            upload_connection_type: Some("SATELLITE".into()),
            ..ConfigPatch::default()
        };
        assert!(base.merged(&bad_connection).unwrap_err().is_config_error());
    }

    #[test]
    fn test_handle_configure_is_all_or_nothing() {
        let handle = ConfigHandle::new(CaptureConfig::default());
        let before = handle.snapshot();

        let patch = ConfigPatch {
            keep_locations_for: Some(7),
            upload_fields: Some(vec!["speed".into(), "bogus".into()]),
            ..ConfigPatch::default()
        };
        assert!(handle.configure(&patch).is_err());
        assert_eq!(*handle.snapshot(), *before);

        let patch = ConfigPatch {
            keep_locations_for: Some(7),
            ..ConfigPatch::default()
        };
        let after = handle.configure(&patch).unwrap();
        assert_eq!(after.keep_locations_for, 7);
        assert_eq!(handle.snapshot().keep_locations_for, 7);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let handle = ConfigHandle::new(CaptureConfig::default());
        let mut rx = handle.subscribe();

        handle
            .configure(&ConfigPatch {
                upload_frequency: Some(42),
                ..ConfigPatch::default()
            })
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().upload_frequency, 42);
    }

    #[test]
    fn test_patch_from_host_json() {
        let patch: ConfigPatch = serde_json::from_str(
            r#"{"upload_enabled": true, "upload_extra_params": {"device": "phone-7", "v": "2"}}"#,
        )
        .unwrap();
        assert_eq!(patch.upload_enabled, Some(true));
        assert_eq!(patch.upload_extra_params.unwrap()["v"], "2");
        assert!(patch.upload_url.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GEOTRAIL_UPLOAD_URL", "https://env.example/up"),
            ("GEOTRAIL_UPLOAD_ENABLED", "true"),
            ("GEOTRAIL_UPLOAD_FREQUENCY", "120"),
            ("GEOTRAIL_KEEP_LOCATIONS_FOR", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = CaptureConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert!(config.upload_enabled);
        assert_eq!(config.upload_url.as_deref(), Some("https://env.example/up"));
        assert_eq!(config.upload_frequency, 120);
        assert_eq!(config.keep_locations_for, 30);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("capture.toml");

        let mut config = enabled();
        config
            .upload_extra_params
            .insert("device".into(), "phone-7".into());
        config.save(Some(path.clone())).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("upload_connection_type = \"WIFI+CELLULAR\""));

        let loaded: CaptureConfig = toml::from_str(&text).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_order_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.toml");
        std::fs::write(
            &path,
            r#"
upload_enabled = true
upload_url = "https://file.example/up"
upload_frequency = 300
keep_locations_for = 7

[upload_extra_params]
device = "phone-7"
"#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [("GEOTRAIL_UPLOAD_FREQUENCY", "60")]
            .into_iter()
            .collect();
        let config =
            CaptureConfig::load_with(Some(path), |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.upload_url.as_deref(), Some("https://file.example/up"));
        assert_eq!(config.upload_frequency, 60);
        assert_eq!(config.keep_locations_for, 7);
        assert_eq!(config.upload_extra_params["device"], "phone-7");
        assert_eq!(config.time_filter, 30);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            CaptureConfig::load_with(Some(dir.path().join("absent.toml")), |_| None).unwrap();
        assert_eq!(config, CaptureConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("garbled.toml");
        std::fs::write(&path, "upload_frequency = \"soon\"").unwrap();
        assert!(CaptureConfig::load_with(Some(path), |_| None).is_err());

        let path = dir.path().join("no-url.toml");
        std::fs::write(&path, "upload_enabled = true").unwrap();
        let err = CaptureConfig::load_with(Some(path.clone()), |_| None).unwrap_err();
        assert!(matches!(err, SyncError::InvalidUrl(_)));

        // The environment can supply what the file lacks.
        let config = CaptureConfig::load_with(Some(path), |k| {
            (k == "GEOTRAIL_UPLOAD_URL").then(|| "https://env.example/up".to_string())
        })
        .unwrap();
        assert!(config.upload_enabled);
    }
}
