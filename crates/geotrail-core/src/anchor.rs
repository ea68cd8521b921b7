//! # Pagination Anchors
//!
//! An anchor marks a position in the location store's total order.
//!
//! ## Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    (timestamp, id) total order                          │
//! │                                                                         │
//! │  row:     (100,1)  (200,2)  (200,5)  (300,3)  (400,4)                  │
//! │                       ▲                                                 │
//! │                       └── Anchor { timestamp: 200, id: 2 }              │
//! │                                                                         │
//! │  query(anchor) returns rows strictly after the marker:                 │
//! │      timestamp > 200  OR  (timestamp = 200 AND id > 2)                  │
//! │                                                                         │
//! │  An anchor names a row by value, not by offset, so inserts between     │
//! │  calls never shift an anchor that was already issued.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Encoding
//! 16 bytes (`timestamp` then `id`, both big-endian `i64`) encoded as
//! URL-safe base64 without padding. The token is opaque to callers and stable
//! across process restarts.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Encoded anchor length in bytes before base64.
const ANCHOR_BYTES: usize = 16;

/// A position in (timestamp, id) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Anchor {
    /// Timestamp of the marked row. Compared first.
    pub timestamp: i64,

    /// Surrogate id of the marked row. Breaks timestamp ties.
    pub id: i64,
}

impl Anchor {
    /// Creates an anchor for the given row position.
    pub const fn new(timestamp: i64, id: i64) -> Self {
        Anchor { timestamp, id }
    }

    /// Encodes the anchor as an opaque token.
    pub fn encode(&self) -> String {
        let mut bytes = [0u8; ANCHOR_BYTES];
        bytes[..8].copy_from_slice(&self.timestamp.to_be_bytes());
        bytes[8..].copy_from_slice(&self.id.to_be_bytes());
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Decodes a token produced by [`Anchor::encode`].
    pub fn decode(token: &str) -> CoreResult<Self> {
        let invalid = |reason: &str| CoreError::InvalidAnchor {
            anchor: token.to_string(),
            reason: reason.to_string(),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| invalid(&e.to_string()))?;

        if bytes.len() != ANCHOR_BYTES {
            return Err(invalid("wrong length"));
        }

        let mut ts = [0u8; 8];
        let mut id = [0u8; 8];
        ts.copy_from_slice(&bytes[..8]);
        id.copy_from_slice(&bytes[8..]);

        Ok(Anchor {
            timestamp: i64::from_be_bytes(ts),
            id: i64::from_be_bytes(id),
        })
    }

    /// Decodes an optional token, treating `None` and `""` as "from the
    /// beginning".
    pub fn decode_optional(token: Option<&str>) -> CoreResult<Option<Self>> {
        match token.map(str::trim) {
            None | Some("") => Ok(None),
            Some(t) => Anchor::decode(t).map(Some),
        }
    }
}

impl std::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl std::str::FromStr for Anchor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Anchor::decode(s)
    }
}
