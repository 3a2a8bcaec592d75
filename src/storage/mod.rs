//! Storage layer abstractions for ReflectDB.
//!
//! This module provides a trait-based abstraction over the storage engine,
//! so the read-path repair and the import pipeline can be exercised
//! against any backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ReflectDB                               │
//! │                         │                                    │
//! │                         ▼                                    │
//! │              ┌─────────────────────┐                        │
//! │              │    StoreHandle      │  ← connection cache    │
//! │              └─────────────────────┘                        │
//! │                         │                                    │
//! │                         ▼                                    │
//! │              ┌─────────────────────┐                        │
//! │              │   StorageEngine     │  ← Trait               │
//! │              └─────────────────────┘                        │
//! │                         ▲                                    │
//! │                   ┌─────┴─────┐                              │
//! │                   │RedbStorage│                              │
//! │                   └───────────┘                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records and settings come back *raw* (decoded JSON, not yet validated):
//! the store does not trust its own bytes. Turning them into typed values
//! is the job of [`crate::record::repair`].

pub mod handle;
pub mod migration;
pub mod redb;
pub mod schema;

pub use self::redb::RedbStorage;
pub use handle::StoreHandle;
pub use schema::{DatabaseMetadata, MetadataEntry, DATA_VERSION, SCHEMA_VERSION};

use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::insight::DerivedInsight;
use crate::record::Record;
use crate::settings::Settings;
use crate::types::{InsightId, RecordId};

/// A stored value decoded into untrusted JSON.
///
/// `value` is `None` when the stored bytes are not JSON at all (a torn or
/// foreign write). The key is always trustworthy.
#[derive(Clone, Debug, PartialEq)]
pub struct RawEntry {
    /// Storage key (record id, or the settings key).
    pub key: String,
    /// Decoded value, if the bytes were JSON.
    pub value: Option<Value>,
}

impl RawEntry {
    pub(crate) fn decode(key: &str, bytes: &[u8]) -> Self {
        Self {
            key: key.to_string(),
            value: serde_json::from_slice(bytes).ok(),
        }
    }
}

/// Storage engine trait for ReflectDB.
///
/// This trait defines the contract that any storage backend must implement.
/// Each method is one atomic operation: it opens and commits (or drops)
/// its own transaction.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow the database to be shared
/// across threads. The engine handles internal synchronization.
pub trait StorageEngine: Send + Sync {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Returns the database metadata.
    ///
    /// The metadata includes the layout version and timestamps.
    fn metadata(&self) -> &DatabaseMetadata;

    /// Returns the path to the database file, if applicable.
    fn path(&self) -> Option<&Path>;

    /// Performs a harmless read against the settings table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot serve reads.
    fn health_check(&self) -> Result<()>;

    // =========================================================================
    // Records
    // =========================================================================

    /// Inserts or replaces a record and keeps the date index in sync.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateDate` if another record already
    /// owns `record.date_iso`. Nothing is written in that case.
    fn put_record(&self, record: &Record) -> Result<()>;

    /// Reads one record without validating it.
    ///
    /// Returns `None` if no record with the given id exists.
    fn get_record_raw(&self, id: &RecordId) -> Result<Option<RawEntry>>;

    /// Reads every record without validating them, in id order.
    fn list_records_raw(&self) -> Result<Vec<RawEntry>>;

    /// Looks up which record owns a calendar date.
    fn record_id_for_date(&self, date_iso: &str) -> Result<Option<RecordId>>;

    /// Permanently deletes a record and releases its date.
    ///
    /// Returns `true` if the record existed.
    fn delete_record(&self, id: &RecordId) -> Result<bool>;

    /// Number of stored records.
    fn count_records(&self) -> Result<u64>;

    // =========================================================================
    // Settings
    // =========================================================================

    /// Replaces the settings singleton.
    fn put_settings(&self, settings: &Settings) -> Result<()>;

    /// Reads the settings singleton without validating it.
    ///
    /// Returns `None` if settings were never written.
    fn get_settings_raw(&self) -> Result<Option<RawEntry>>;

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Writes a metadata entry.
    ///
    /// # Errors
    ///
    /// Returns a validation error for the reserved database metadata key.
    fn put_metadata(&self, key: &str, entry: &MetadataEntry) -> Result<()>;

    /// Reads a metadata entry.
    fn get_metadata(&self, key: &str) -> Result<Option<MetadataEntry>>;

    /// Reads every metadata entry except the reserved database metadata.
    fn list_metadata(&self) -> Result<Vec<(String, MetadataEntry)>>;

    /// Deletes a metadata entry. Returns `true` if it existed.
    fn delete_metadata(&self, key: &str) -> Result<bool>;

    // =========================================================================
    // Insights
    // =========================================================================

    /// Stores an insight and its creation-time index entry.
    fn put_insight(&self, insight: &DerivedInsight) -> Result<()>;

    /// Reads an insight by id.
    fn get_insight(&self, id: InsightId) -> Result<Option<DerivedInsight>>;

    /// Reads every insight, oldest first.
    fn list_insights(&self) -> Result<Vec<DerivedInsight>>;

    /// Reads the `limit` most recent insights, newest first.
    fn recent_insights(&self, limit: usize) -> Result<Vec<DerivedInsight>>;

    /// Deletes an insight. Returns `true` if it existed.
    fn delete_insight(&self, id: InsightId) -> Result<bool>;

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Empties every collection in one transaction.
    ///
    /// Tables missing from the file are tolerated. The database metadata
    /// survives; settings do not.
    fn clear_all(&self) -> Result<()>;

    /// Replaces all records and the settings, and records the import, in
    /// one transaction.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateDate` if two records share a
    /// date. The store is unchanged in that case.
    fn replace_records_and_settings(
        &self,
        records: &[Record],
        settings: &Settings,
        import_entry: &MetadataEntry,
    ) -> Result<()>;
}
