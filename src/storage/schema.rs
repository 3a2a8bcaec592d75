//! Database schema definitions and versioning.
//!
//! This module defines the table structure for the redb storage engine.
//! All table definitions are compile-time constants to ensure consistency.
//!
//! # Schema Versioning
//!
//! Two independent version numbers exist:
//!
//! - [`SCHEMA_VERSION`] is the on-disk table layout. It is stored in
//!   [`DatabaseMetadata`] and moved forward by the steps registered in
//!   [`super::migration::MIGRATIONS`].
//! - [`DATA_VERSION`] is the shape of a record as it appears in an export
//!   document. Imports advertise it and are rejected outside `1..=DATA_VERSION`.
//!
//! # Table Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ METADATA_TABLE                                    (layout 1)│
//! │   Key: &str                                                  │
//! │   Value: &[u8]                                               │
//! │   "db_metadata" -> DatabaseMetadata (bincode)                │
//! │   any other key -> MetadataEntry (JSON)                      │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ RECORDS_TABLE                                     (layout 1)│
//! │   Key: &str (record id)                                      │
//! │   Value: &[u8] (JSON-encoded Record)                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │ RECORDS_BY_DATE_TABLE (unique index)              (layout 1)│
//! │   Key: &str (dateISO) -> Value: &str (record id)             │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ SETTINGS_TABLE                                    (layout 1)│
//! │   Key: &str ("app") -> Value: &[u8] (JSON-encoded Settings)  │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ INSIGHTS_TABLE                                    (layout 2)│
//! │   Key: &[u8; 16] (InsightId) -> Value: &[u8] (bincode)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │ INSIGHTS_BY_CREATED_TABLE (multimap)              (layout 2)│
//! │   Key: i64 (created_at millis) -> Value: &[u8; 16]           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records and settings are stored as JSON rather than bincode so that
//! bytes written under an older record shape still decode into an
//! untrusted [`serde_json::Value`] and can be repaired on read.

use redb::{MultimapTableDefinition, TableDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Timestamp;

/// Current on-disk layout version.
///
/// Increment this together with a new step in
/// [`MIGRATIONS`](super::migration::MIGRATIONS).
pub const SCHEMA_VERSION: u32 = 2;

/// Current record data version, as advertised in export documents.
pub const DATA_VERSION: u32 = 1;

/// Metadata key holding the bincode-encoded [`DatabaseMetadata`].
pub const DB_METADATA_KEY: &str = "db_metadata";

/// Settings key in [`SETTINGS_TABLE`].
pub const SETTINGS_KEY: &str = "app";

/// Metadata key written on every export.
pub const EXPORTED_AT_KEY: &str = "exportedAt";

/// Metadata key written on every successful import.
pub const LAST_IMPORT_KEY: &str = "lastImport";

/// Metadata key for the last external sync, set by callers.
pub const LAST_SYNC_KEY: &str = "lastSync";

/// Maximum insight content size in characters.
pub const MAX_INSIGHT_CONTENT_LENGTH: usize = 10_000;

/// Maximum insight subject length in characters.
pub const MAX_INSIGHT_SUBJECT_LENGTH: usize = 200;

// ============================================================================
// Table Definitions
// ============================================================================

/// Metadata table for database-level information and small diagnostics.
pub const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Records table.
///
/// Key: record id
/// Value: JSON-encoded Record
pub const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Index: record id by calendar date.
///
/// A plain table rather than a multimap: each date maps to at most one
/// record, which is how date uniqueness is enforced.
pub const RECORDS_BY_DATE_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("records_by_date");

/// Settings table (single row under [`SETTINGS_KEY`]).
pub const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

/// Derived insights table.
///
/// Key: InsightId as 16-byte UUID
/// Value: bincode-serialized DerivedInsight
pub const INSIGHTS_TABLE: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("insights");

/// Index: insights by creation time.
///
/// Multimap so that insights created in the same millisecond coexist.
pub const INSIGHTS_BY_CREATED_TABLE: MultimapTableDefinition<i64, &[u8; 16]> =
    MultimapTableDefinition::new("insights_by_created");

// ============================================================================
// Database Metadata
// ============================================================================

/// Database metadata stored under [`DB_METADATA_KEY`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    /// On-disk layout version.
    pub schema_version: u32,

    /// Timestamp when the database was created.
    pub created_at: Timestamp,

    /// Last time the database was opened (updated on each open).
    pub last_opened_at: Timestamp,
}

impl DatabaseMetadata {
    /// Creates new metadata for a fresh database at the given layout version.
    pub fn new(schema_version: u32) -> Self {
        let now = Timestamp::now();
        Self {
            schema_version,
            created_at: now,
            last_opened_at: now,
        }
    }

    /// Updates the last_opened_at timestamp.
    pub fn touch(&mut self) {
        self.last_opened_at = Timestamp::now();
    }

    /// Returns true if the layout is behind `target` and needs an upgrade.
    pub fn is_behind(&self, target: u32) -> bool {
        self.schema_version < target
    }
}

/// A value in the metadata table (any key except [`DB_METADATA_KEY`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    /// Caller-defined value.
    pub value: Value,
    /// When the value was last written.
    pub updated_at: Timestamp,
}

impl MetadataEntry {
    /// Wraps a value, stamped with the current time.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            updated_at: Timestamp::now(),
        }
    }
}

/// Reads the date out of stored record bytes without full validation.
///
/// Used to keep the date index in sync when a record moves to another day.
pub(crate) fn stored_date(bytes: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    value.get("dateISO")?.as_str().map(str::to_string)
}
