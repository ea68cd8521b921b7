//! # Domain Types
//!
//! Core domain types used throughout Geotrail.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Fix        │   │     Sample      │   │  UploadField    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  timestamp      │──►│  id (store key) │   │  timestamp      │       │
//! │  │  latitude       │   │  timestamp      │   │  latitude ...   │       │
//! │  │  longitude ...  │   │  latitude ...   │   │  speed          │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ RequestFormat   │   │ ConnectionType  │   │  NetworkKind    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  JSON           │   │  WIFI_ONLY      │   │  Offline        │       │
//! │  │  FORM_URL_...   │   │  WIFI+CELLULAR  │   │  Wifi           │       │
//! │  └─────────────────┘   │  ANY            │   │  Cellular/Other │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! A `Sample` read back from a table carries that table's surrogate `id`.
//! The location store and the upload queue have independent key spaces, so
//! the same reading has unrelated ids in each.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::anchor::Anchor;
use crate::error::ValidationError;

// =============================================================================
// Fix
// =============================================================================

/// A raw location reading as delivered by the platform sensor.
///
/// Becomes a [`Sample`] once it is written to a table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Fix {
    /// Capture time, epoch seconds.
    pub timestamp: i64,

    /// Signed degrees.
    pub latitude: f64,

    /// Signed degrees.
    pub longitude: f64,

    /// Estimated radius in meters.
    pub accuracy: u32,

    /// Degrees clockwise from north, `None` when the sensor has no bearing.
    pub heading: Option<f64>,

    /// Meters per second.
    pub speed: f64,
}

impl Fix {
    /// Creates a fix with unknown heading and zero accuracy/speed.
    pub fn new(timestamp: i64, latitude: f64, longitude: f64) -> Self {
        Fix {
            timestamp,
            latitude,
            longitude,
            accuracy: 0,
            heading: None,
            speed: 0.0,
        }
    }

    /// Sets the accuracy radius.
    pub fn with_accuracy(mut self, accuracy: u32) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Sets the heading.
    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Sets the speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Converts into an unpersisted sample.
    pub fn into_sample(self) -> Sample {
        Sample {
            id: None,
            timestamp: self.timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            heading: self.heading,
            speed: self.speed,
        }
    }
}

// =============================================================================
// Sample
// =============================================================================

/// One captured location reading.
///
/// Immutable once it has an `id`: tables support append, read and
/// delete-by-criteria only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sample {
    /// Table-assigned surrogate key. `None` before persistence.
    pub id: Option<i64>,

    /// Capture time, epoch seconds. Not unique.
    pub timestamp: i64,

    /// Signed degrees.
    pub latitude: f64,

    /// Signed degrees.
    pub longitude: f64,

    /// Estimated radius in meters.
    pub accuracy: u32,

    /// Degrees clockwise from north, `None` when unknown.
    pub heading: Option<f64>,

    /// Meters per second.
    pub speed: f64,
}

impl Sample {
    /// Returns the capture time as a UTC datetime.
    ///
    /// `None` if the timestamp is outside chrono's representable range.
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    /// Returns the pagination anchor for this sample, if persisted.
    pub fn anchor(&self) -> Option<Anchor> {
        self.id.map(|id| Anchor::new(self.timestamp, id))
    }

    /// Returns a copy with the store id cleared.
    ///
    /// Used when re-inserting into another table (ids are per table).
    pub fn without_id(&self) -> Sample {
        Sample {
            id: None,
            ..self.clone()
        }
    }

    /// Returns the captured values as a [`Fix`].
    pub fn to_fix(&self) -> Fix {
        Fix {
            timestamp: self.timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            heading: self.heading,
            speed: self.speed,
        }
    }

    /// Returns the JSON value of one upload field.
    ///
    /// Unknown heading serializes as `null`.
    pub fn json_value(&self, field: UploadField) -> Value {
        match field {
            UploadField::Timestamp => Value::from(self.timestamp),
            UploadField::Latitude => Value::from(self.latitude),
            UploadField::Longitude => Value::from(self.longitude),
            UploadField::Accuracy => Value::from(self.accuracy),
            UploadField::Heading => self.heading.map(Value::from).unwrap_or(Value::Null),
            UploadField::Speed => Value::from(self.speed),
        }
    }

    /// Returns the form-encoding text of one upload field.
    ///
    /// Unknown heading is sent as an empty value.
    pub fn form_value(&self, field: UploadField) -> String {
        match field {
            UploadField::Timestamp => self.timestamp.to_string(),
            UploadField::Latitude => self.latitude.to_string(),
            UploadField::Longitude => self.longitude.to_string(),
            UploadField::Accuracy => self.accuracy.to_string(),
            UploadField::Heading => self.heading.map(|h| h.to_string()).unwrap_or_default(),
            UploadField::Speed => self.speed.to_string(),
        }
    }
}

// =============================================================================
// Upload Field
// =============================================================================

/// A sample field that can be serialized into an upload payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum UploadField {
    Timestamp,
    Latitude,
    Longitude,
    Accuracy,
    Heading,
    Speed,
}

impl UploadField {
    /// Every field, in canonical order.
    pub const ALL: [UploadField; 6] = [
        UploadField::Timestamp,
        UploadField::Latitude,
        UploadField::Longitude,
        UploadField::Accuracy,
        UploadField::Heading,
        UploadField::Speed,
    ];

    /// Wire name of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadField::Timestamp => "timestamp",
            UploadField::Latitude => "latitude",
            UploadField::Longitude => "longitude",
            UploadField::Accuracy => "accuracy",
            UploadField::Heading => "heading",
            UploadField::Speed => "speed",
        }
    }
}

impl std::fmt::Display for UploadField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UploadField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UploadField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "upload_fields".to_string(),
                value: s.to_string(),
                allowed: UploadField::ALL.iter().map(|f| f.to_string()).collect(),
            })
    }
}

// =============================================================================
// Request Format
// =============================================================================

/// Wire encoding of an upload batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum RequestFormat {
    /// `application/json` body.
    #[default]
    #[serde(rename = "JSON")]
    Json,

    /// `application/x-www-form-urlencoded` body.
    #[serde(rename = "FORM_URL_ENCODED")]
    FormUrlEncoded,
}

impl RequestFormat {
    /// Wire name of the format as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestFormat::Json => "JSON",
            RequestFormat::FormUrlEncoded => "FORM_URL_ENCODED",
        }
    }

    /// HTTP content type for the encoded body.
    pub fn content_type(&self) -> &'static str {
        match self {
            RequestFormat::Json => "application/json",
            RequestFormat::FormUrlEncoded => "application/x-www-form-urlencoded",
        }
    }
}

impl std::fmt::Display for RequestFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "JSON" => Ok(RequestFormat::Json),
            "FORM_URL_ENCODED" => Ok(RequestFormat::FormUrlEncoded),
            _ => Err(ValidationError::NotAllowed {
                field: "upload_request_format".to_string(),
                value: s.to_string(),
                allowed: vec!["JSON".to_string(), "FORM_URL_ENCODED".to_string()],
            }),
        }
    }
}

// =============================================================================
// Network
// =============================================================================

/// The kind of network path currently available, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    /// No network path.
    #[default]
    Offline,
    Wifi,
    Cellular,
    /// Ethernet, VPN-only, or anything else the platform cannot classify.
    Other,
}

impl NetworkKind {
    /// Returns true if any network path exists.
    pub fn is_connected(&self) -> bool {
        !matches!(self, NetworkKind::Offline)
    }
}

impl std::fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkKind::Offline => write!(f, "offline"),
            NetworkKind::Wifi => write!(f, "wifi"),
            NetworkKind::Cellular => write!(f, "cellular"),
            NetworkKind::Other => write!(f, "other"),
        }
    }
}

/// Which network paths uploads may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ConnectionType {
    #[serde(rename = "WIFI_ONLY")]
    WifiOnly,

    #[default]
    #[serde(rename = "WIFI+CELLULAR")]
    WifiAndCellular,

    #[serde(rename = "ANY")]
    Any,
}

impl ConnectionType {
    /// Returns true if uploads are allowed over the given network.
    pub fn permits(&self, network: NetworkKind) -> bool {
        match (self, network) {
            (_, NetworkKind::Offline) => false,
            (ConnectionType::WifiOnly, kind) => kind == NetworkKind::Wifi,
            (ConnectionType::WifiAndCellular, kind) => {
                matches!(kind, NetworkKind::Wifi | NetworkKind::Cellular)
            }
            (ConnectionType::Any, _) => true,
        }
    }

    /// Wire name as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::WifiOnly => "WIFI_ONLY",
            ConnectionType::WifiAndCellular => "WIFI+CELLULAR",
            ConnectionType::Any => "ANY",
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConnectionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "WIFI_ONLY" | "WIFI" => Ok(ConnectionType::WifiOnly),
            "WIFI+CELLULAR" | "WIFI_CELLULAR" => Ok(ConnectionType::WifiAndCellular),
            "ANY" => Ok(ConnectionType::Any),
            _ => Err(ValidationError::NotAllowed {
                field: "upload_connection_type".to_string(),
                value: s.to_string(),
                allowed: vec![
                    "WIFI_ONLY".to_string(),
                    "WIFI+CELLULAR".to_string(),
                    "ANY".to_string(),
                ],
            }),
        }
    }
}

// =============================================================================
// Query Page
// =============================================================================

/// One page of a forward pagination over the location store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueryPage {
    /// Samples in ascending (timestamp, id) order.
    pub samples: Vec<Sample>,

    /// Opaque token for the position after the last returned sample.
    ///
    /// Equals the request anchor when the page is empty.
    pub next_anchor: Option<String>,
}
