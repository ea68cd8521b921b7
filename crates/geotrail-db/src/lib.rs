//! # geotrail-db: Database Layer for Geotrail
//!
//! This crate provides durable storage for captured samples.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Geotrail Data Flow                               │
//! │                                                                         │
//! │  CaptureController.record(fix)                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    geotrail-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │    Repositories    │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ LocationStoreRepo  │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│ UploadQueueRepo    │  │ 001_init   │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL): location_store, upload_queue                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`pool`] - Connection pool and database handle
//! - [`migrations`] - Embedded schema migrations
//! - [`error`] - Database error types
//! - [`repository`] - Location store and upload queue
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geotrail_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("geotrail.db")).await?;
//!
//! let id = db.locations().append(&fix.into_sample()).await?;
//! db.upload_queue().enqueue(&fix.into_sample()).await?;
//!
//! let (page, next) = db.locations().query(None, 100).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::location::LocationStoreRepository;
pub use repository::queue::UploadQueueRepository;
