//! # geotrail-core: Pure Types for Geotrail
//!
//! This crate holds the data model shared by the storage layer and the sync
//! engine. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Geotrail Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Host application (JS bridge)                     │   │
//! │  │    configure ─► start ─► query(anchor, limit) ─► stop           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 geotrail-sync (engine + facade)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ geotrail-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  anchor   │  │  upload   │  │ validation│  │   │
//! │  │   │  Sample   │  │  Anchor   │  │  fields   │  │   rules   │  │   │
//! │  │   │   Fix     │  │ (ts, id)  │  │  formats  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 geotrail-db (Database Layer)                    │   │
//! │  │          location_store, upload_queue, migrations               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - `Sample`, `Fix`, network and upload enums
//! - [`anchor`] - Opaque pagination anchors
//! - [`error`] - Domain error types
//! - [`validation`] - Sample and option validation
//!
//! ## Example Usage
//!
//! ```rust
//! use geotrail_core::{Anchor, Fix};
//!
//! let fix = Fix::new(1_700_000_000, 52.52, 13.405);
//! let sample = fix.into_sample();
//! assert!(sample.id.is_none());
//!
//! let anchor = Anchor::new(1_700_000_000, 42);
//! let token = anchor.encode();
//! assert_eq!(Anchor::decode(&token).unwrap(), anchor);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod anchor;
pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use anchor::Anchor;
pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Seconds in one retention day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Rows fetched per statement when reading a page.
///
/// Larger pages are assembled from several reads; the caller still gets
/// `limit` rows unless the data runs out.
pub const MAX_PAGE_SIZE: u32 = 10_000;
