//! # ReflectDB
//!
//! Embedded, versioned, self-repairing store for daily reflection journals.
//!
//! ReflectDB keeps one record per calendar day, the application settings,
//! small metadata values and derived insights in a single local file. Every
//! value read from or written to that file passes through a repairing
//! validator, so data written by older builds, partial writes and hand-made
//! backups all come back in a known shape.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reflectdb::prelude::*;
//!
//! // Open or create a store (runs pending migrations)
//! let db = ReflectDB::open("./reflect.db", Config::default())?;
//!
//! // Save today's entry; later saves merge into it
//! db.save_record(RecordDraft::new().good(Section::with_items(["fajr"])))?;
//!
//! // Back up and restore
//! let backup = db.export_json()?;
//! let summary = db.import_json(&backup)?;
//! println!("{summary}");
//!
//! // Clean up
//! db.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Record
//!
//! A **record** is one day's entry: four optional [`Section`]s (good,
//! improve, severe slip, missed opportunity), a supplication text and a
//! privacy level. At most one record exists per date.
//!
//! ### Repair
//!
//! Invalid fields are never rejected. They are replaced with a safe default
//! and described in a [`ValidationReport`] warning. Records repaired on read
//! are written back (see [`Config::repair_on_read`]).
//!
//! ### Versions
//!
//! Two independent numbers are tracked:
//!
//! - the on-disk layout version ([`SCHEMA_VERSION`]), upgraded by the
//!   migrations in [`storage::migration`] when a store is opened
//! - the record data version ([`DATA_VERSION`]), carried in exports and
//!   upgraded by [`transform`] on import
//!
//! ## Thread Safety
//!
//! `ReflectDB` is `Send + Sync` and can be shared across threads using `Arc`.
//! The underlying redb file uses MVCC for concurrent reads with exclusive
//! write locking.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod db;
mod error;
mod types;
mod validation;

pub mod storage;

// Domain modules
pub mod exchange;
pub mod insight;
pub mod record;
pub mod settings;
pub mod transform;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main database interface
pub use db::ReflectDB;

// Configuration
pub use config::{Config, SyncMode};

// Error handling
pub use error::{
    ImportError, NotFoundError, ReflectDBError, Result, StorageError, ValidationError,
};

// Core types
pub use types::{InsightId, RecordId, Timestamp};

// Validation
pub use validation::ValidationReport;

// Domain types
pub use exchange::{ExportDocument, ImportSummary};
pub use insight::{DerivedInsight, InsightKind, InsightProvider, InsightRequest, NewInsight};
pub use record::{LoadReport, Patch, PrivacyLevel, Record, RecordDraft, Section};
pub use settings::{Settings, SettingsUpdate};

// Storage (for advanced users)
pub use storage::{DatabaseMetadata, MetadataEntry, DATA_VERSION, SCHEMA_VERSION};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common ReflectDB usage.
///
/// ```rust
/// use reflectdb::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{Config, SyncMode};
    pub use crate::db::ReflectDB;
    pub use crate::error::{ReflectDBError, Result};
    pub use crate::exchange::{ExportDocument, ImportSummary};
    pub use crate::record::{PrivacyLevel, Record, RecordDraft, Section};
    pub use crate::settings::{Settings, SettingsUpdate};
    pub use crate::types::{InsightId, RecordId, Timestamp};
}
