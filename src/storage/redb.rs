//! redb storage engine implementation.
//!
//! This module provides the primary storage backend for ReflectDB using
//! [redb](https://docs.rs/redb), a pure Rust embedded key-value store.
//!
//! # Features
//!
//! - ACID transactions with MVCC
//! - Single-writer, multiple-reader concurrency
//! - Automatic crash recovery
//! - Zero external dependencies (pure Rust)
//!
//! # Opening
//!
//! Opening reads the stored [`DatabaseMetadata`] (absent on a fresh file),
//! then runs the pending migration steps and writes the new metadata in a
//! single write transaction. A failed step drops the transaction, so the
//! file stays at its previous layout.

use std::path::{Path, PathBuf};

use ::redb::{
    Database, ReadableMultimapTable, ReadableTable, ReadableTableMetadata, Table, TableError,
    WriteTransaction,
};
use tracing::{debug, info, instrument, warn};

use super::migration::{self, Migration, MIGRATIONS};
use super::schema::{
    stored_date, DatabaseMetadata, MetadataEntry, DB_METADATA_KEY, INSIGHTS_BY_CREATED_TABLE,
    INSIGHTS_TABLE, LAST_IMPORT_KEY, METADATA_TABLE, RECORDS_BY_DATE_TABLE, RECORDS_TABLE,
    SETTINGS_KEY, SETTINGS_TABLE,
};
use super::{RawEntry, StorageEngine};
use crate::config::{Config, SyncMode};
use crate::error::{Result, StorageError, ValidationError};
use crate::insight::DerivedInsight;
use crate::record::Record;
use crate::settings::Settings;
use crate::types::{InsightId, RecordId};

/// First layout version that has the insight tables.
const INSIGHTS_LAYOUT: u32 = 2;

type RecordsTable<'txn> = Table<'txn, &'static str, &'static [u8]>;
type DateIndex<'txn> = Table<'txn, &'static str, &'static str>;

/// redb storage engine wrapper.
///
/// This struct holds the redb database handle and cached metadata.
/// It implements [`StorageEngine`] for use with ReflectDB.
///
/// # Thread Safety
///
/// `RedbStorage` is `Send + Sync`. redb handles internal synchronization
/// using MVCC for readers and exclusive locking for writers.
#[derive(Debug)]
pub struct RedbStorage {
    /// The redb database handle.
    db: Database,

    /// Cached database metadata.
    metadata: DatabaseMetadata,

    /// Path to the database file.
    path: PathBuf,

    /// Durability applied to every write transaction.
    sync_mode: SyncMode,
}

impl RedbStorage {
    /// Opens or creates a database at the given path.
    ///
    /// A fresh file is initialized by running every migration step up to
    /// `config.target_schema_version`. An existing file is upgraded from its
    /// stored version the same way.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The database is locked by another open connection
    /// - The database metadata is corrupted
    /// - The stored layout is newer than `config.target_schema_version`
    /// - A migration step fails (the file is left unchanged)
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use reflectdb::{Config, storage::RedbStorage};
    ///
    /// let storage = RedbStorage::open("./journal.db", &Config::default())?;
    /// ```
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        Self::open_with_steps(path.as_ref(), config, MIGRATIONS)
    }

    /// Opens with an explicit migration registry.
    pub(crate) fn open_with_steps(
        path: &Path,
        config: &Config,
        steps: &[Migration],
    ) -> Result<Self> {
        let db = Self::create_database(path)?;
        let stored = Self::read_metadata(&db)?;

        debug!(
            stored_version = stored.as_ref().map(|m| m.schema_version),
            target_version = config.target_schema_version,
            "Opening storage engine"
        );

        let metadata = Self::upgrade(&db, stored, config, steps)?;

        Ok(Self {
            db,
            metadata,
            path: path.to_path_buf(),
            sync_mode: config.sync_mode,
        })
    }

    /// Creates the redb database file, or opens the existing one.
    fn create_database(path: &Path) -> Result<Database> {
        let db = Database::builder()
            .create(path)
            .map_err(StorageError::from)?;

        debug!("Database file opened successfully");
        Ok(db)
    }

    /// Reads the stored metadata, or `None` for a never-initialized file.
    fn read_metadata(db: &Database) -> Result<Option<DatabaseMetadata>> {
        let read_txn = db.begin_read().map_err(StorageError::from)?;

        let table = match read_txn.open_table(METADATA_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => {
                return Err(
                    StorageError::corrupted(format!("Cannot open metadata table: {}", e)).into(),
                )
            }
        };

        let Some(bytes) = table.get(DB_METADATA_KEY).map_err(StorageError::from)? else {
            return Ok(None);
        };

        let metadata = bincode::deserialize::<DatabaseMetadata>(bytes.value())
            .map_err(|e| StorageError::corrupted(format!("Invalid metadata format: {}", e)))?;
        Ok(Some(metadata))
    }

    /// Brings the file to the target layout in one write transaction.
    #[instrument(skip(db, stored, config, steps))]
    fn upgrade(
        db: &Database,
        stored: Option<DatabaseMetadata>,
        config: &Config,
        steps: &[Migration],
    ) -> Result<DatabaseMetadata> {
        let target = config.target_schema_version;
        let from = stored.as_ref().map_or(0, |m| m.schema_version);

        if from > target {
            warn!(
                expected = target,
                found = from,
                "Stored schema is newer than this build"
            );
            return Err(StorageError::SchemaVersionMismatch {
                expected: target,
                found: from,
            }
            .into());
        }

        let mut metadata = stored.unwrap_or_else(|| DatabaseMetadata::new(target));
        metadata.schema_version = target;
        metadata.touch();

        let mut write_txn = db.begin_write().map_err(StorageError::from)?;
        write_txn.set_durability(config.sync_mode.durability());

        let applied = migration::apply_pending(&write_txn, steps, from, target)?;
        write_db_metadata(&write_txn, &metadata)?;

        write_txn.commit().map_err(StorageError::from)?;

        if applied > 0 {
            info!(from, to = target, applied, "Database schema upgraded");
        } else {
            info!(schema_version = target, "Database opened successfully");
        }

        Ok(metadata)
    }

    /// Closes the database. redb flushes on drop.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn close(self) -> Result<()> {
        drop(self.db);
        info!("Storage engine closed");
        Ok(())
    }

    /// Starts a write transaction with the configured durability.
    fn begin_write(&self) -> Result<WriteTransaction> {
        let mut txn = self.db.begin_write().map_err(StorageError::from)?;
        txn.set_durability(self.sync_mode.durability());
        Ok(txn)
    }

    fn require_insights(&self) -> Result<()> {
        if self.metadata.schema_version < INSIGHTS_LAYOUT {
            return Err(StorageError::TableNotFound("insights".to_string()).into());
        }
        Ok(())
    }

    /// Returns a reference to the underlying redb database.
    #[cfg(test)]
    pub(crate) fn database(&self) -> &Database {
        &self.db
    }
}

fn write_db_metadata(txn: &WriteTransaction, metadata: &DatabaseMetadata) -> Result<()> {
    let bytes = bincode::serialize(metadata)?;
    let mut table = txn.open_table(METADATA_TABLE)?;
    table.insert(DB_METADATA_KEY, bytes.as_slice())?;
    Ok(())
}

fn check_metadata_key(key: &str) -> Result<()> {
    if key == DB_METADATA_KEY {
        return Err(ValidationError::invalid_field("key", "reserved for database metadata").into());
    }
    Ok(())
}

/// Writes one record, keeping the date index unique.
fn insert_record(
    records: &mut RecordsTable<'_>,
    by_date: &mut DateIndex<'_>,
    id: &str,
    date: &str,
    bytes: &[u8],
) -> Result<()> {
    let owner = by_date.get(date)?.map(|g| g.value().to_string());
    if let Some(owner) = owner {
        if owner != id {
            return Err(ValidationError::duplicate_date(date, owner).into());
        }
    }

    let previous = records.get(id)?.map(|g| stored_date(g.value()));
    match previous {
        Some(Some(old)) if old != date => release_date(by_date, &old, id)?,
        Some(None) => release_all_dates(by_date, id)?,
        _ => {}
    }

    records.insert(id, bytes)?;
    by_date.insert(date, id)?;
    Ok(())
}

/// Frees `date` in the index if `id` owns it.
fn release_date(by_date: &mut DateIndex<'_>, date: &str, id: &str) -> Result<()> {
    let owned = by_date.get(date)?.is_some_and(|g| g.value() == id);
    if owned {
        by_date.remove(date)?;
    }
    Ok(())
}

/// Frees every date owned by `id`. Used when the stored bytes are unreadable.
fn release_all_dates(by_date: &mut DateIndex<'_>, id: &str) -> Result<()> {
    let mut owned = Vec::new();
    for entry in by_date.iter()? {
        let (date, owner) = entry?;
        if owner.value() == id {
            owned.push(date.value().to_string());
        }
    }
    for date in owned {
        by_date.remove(date.as_str())?;
    }
    Ok(())
}

impl StorageEngine for RedbStorage {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn metadata(&self) -> &DatabaseMetadata {
        &self.metadata
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn health_check(&self) -> Result<()> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;
        let _ = table.get(SETTINGS_KEY)?;
        Ok(())
    }

    // =========================================================================
    // Records
    // =========================================================================

    fn put_record(&self, record: &Record) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        let id = record.id.as_str();
        let date = record.date_iso.as_str();

        let write_txn = self.begin_write()?;
        {
            let mut records = write_txn.open_table(RECORDS_TABLE)?;
            let mut by_date = write_txn.open_table(RECORDS_BY_DATE_TABLE)?;
            insert_record(&mut records, &mut by_date, id, date, &bytes)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        debug!(id, date, "Record saved");
        Ok(())
    }

    fn get_record_raw(&self, id: &RecordId) -> Result<Option<RawEntry>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(RECORDS_TABLE)?;

        let entry = table
            .get(id.as_str())?
            .map(|value| RawEntry::decode(id.as_str(), value.value()));
        Ok(entry)
    }

    fn list_records_raw(&self) -> Result<Vec<RawEntry>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(RECORDS_TABLE)?;

        let mut entries = Vec::new();
        for result in table.iter()? {
            let (key, value) = result?;
            entries.push(RawEntry::decode(key.value(), value.value()));
        }
        Ok(entries)
    }

    fn record_id_for_date(&self, date_iso: &str) -> Result<Option<RecordId>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(RECORDS_BY_DATE_TABLE)?;

        let id = table.get(date_iso)?.map(|g| RecordId::new(g.value()));
        Ok(id)
    }

    fn delete_record(&self, id: &RecordId) -> Result<bool> {
        let write_txn = self.begin_write()?;
        let existed;
        {
            let mut records = write_txn.open_table(RECORDS_TABLE)?;
            let mut by_date = write_txn.open_table(RECORDS_BY_DATE_TABLE)?;

            let removed = records
                .remove(id.as_str())?
                .map(|g| stored_date(g.value()));
            existed = removed.is_some();

            match removed {
                Some(Some(date)) => release_date(&mut by_date, &date, id.as_str())?,
                Some(None) => release_all_dates(&mut by_date, id.as_str())?,
                None => {}
            }
        }
        write_txn.commit().map_err(StorageError::from)?;

        if existed {
            debug!(id = %id, "Record deleted");
        }
        Ok(existed)
    }

    fn count_records(&self) -> Result<u64> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(RECORDS_TABLE)?;
        Ok(table.len()?)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    fn put_settings(&self, settings: &Settings) -> Result<()> {
        let bytes = serde_json::to_vec(settings)?;

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE)?;
            table.insert(SETTINGS_KEY, bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        debug!("Settings saved");
        Ok(())
    }

    fn get_settings_raw(&self) -> Result<Option<RawEntry>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(SETTINGS_TABLE)?;

        let entry = table
            .get(SETTINGS_KEY)?
            .map(|value| RawEntry::decode(SETTINGS_KEY, value.value()));
        Ok(entry)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    fn put_metadata(&self, key: &str, entry: &MetadataEntry) -> Result<()> {
        check_metadata_key(key)?;
        let bytes = serde_json::to_vec(entry)?;

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(METADATA_TABLE)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        debug!(key, "Metadata saved");
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<MetadataEntry>> {
        check_metadata_key(key)?;
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(METADATA_TABLE)?;

        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn list_metadata(&self) -> Result<Vec<(String, MetadataEntry)>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(METADATA_TABLE)?;

        let mut entries = Vec::new();
        for result in table.iter()? {
            let (key, value) = result?;
            if key.value() == DB_METADATA_KEY {
                continue;
            }
            let entry: MetadataEntry = serde_json::from_slice(value.value())?;
            entries.push((key.value().to_string(), entry));
        }
        Ok(entries)
    }

    fn delete_metadata(&self, key: &str) -> Result<bool> {
        check_metadata_key(key)?;
        let write_txn = self.begin_write()?;
        let existed;
        {
            let mut table = write_txn.open_table(METADATA_TABLE)?;
            existed = table.remove(key)?.is_some();
        }
        write_txn.commit().map_err(StorageError::from)?;
        Ok(existed)
    }

    // =========================================================================
    // Insights
    // =========================================================================

    fn put_insight(&self, insight: &DerivedInsight) -> Result<()> {
        self.require_insights()?;
        let bytes = bincode::serialize(insight)?;

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(INSIGHTS_TABLE)?;
            table.insert(insight.id.as_bytes(), bytes.as_slice())?;

            let mut by_created = write_txn.open_multimap_table(INSIGHTS_BY_CREATED_TABLE)?;
            by_created.insert(insight.created_at.as_millis(), insight.id.as_bytes())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        debug!(id = %insight.id, kind = ?insight.kind, "Insight saved");
        Ok(())
    }

    fn get_insight(&self, id: InsightId) -> Result<Option<DerivedInsight>> {
        self.require_insights()?;
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(INSIGHTS_TABLE)?;

        match table.get(id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(value.value())?)),
            None => Ok(None),
        }
    }

    fn list_insights(&self) -> Result<Vec<DerivedInsight>> {
        self.require_insights()?;
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(INSIGHTS_TABLE)?;

        let mut insights = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            insights.push(bincode::deserialize(value.value())?);
        }
        Ok(insights)
    }

    fn recent_insights(&self, limit: usize) -> Result<Vec<DerivedInsight>> {
        self.require_insights()?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(INSIGHTS_TABLE)?;
        let by_created = read_txn.open_multimap_table(INSIGHTS_BY_CREATED_TABLE)?;

        let mut insights = Vec::with_capacity(limit.min(64));
        'scan: for entry in by_created.iter()?.rev() {
            let (_, ids) = entry?;
            for id in ids.rev() {
                let id = id?;
                if let Some(value) = table.get(id.value())? {
                    insights.push(bincode::deserialize(value.value())?);
                }
                if insights.len() >= limit {
                    break 'scan;
                }
            }
        }
        Ok(insights)
    }

    fn delete_insight(&self, id: InsightId) -> Result<bool> {
        self.require_insights()?;
        let write_txn = self.begin_write()?;
        let existed;
        {
            let mut table = write_txn.open_table(INSIGHTS_TABLE)?;
            let removed = match table.remove(id.as_bytes())? {
                Some(value) => Some(bincode::deserialize::<DerivedInsight>(value.value())?),
                None => None,
            };
            existed = removed.is_some();

            if let Some(insight) = removed {
                let mut by_created = write_txn.open_multimap_table(INSIGHTS_BY_CREATED_TABLE)?;
                by_created.remove(insight.created_at.as_millis(), id.as_bytes())?;
            }
        }
        write_txn.commit().map_err(StorageError::from)?;

        if existed {
            debug!(id = %id, "Insight deleted");
        }
        Ok(existed)
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    #[instrument(skip(self))]
    fn clear_all(&self) -> Result<()> {
        let write_txn = self.begin_write()?;

        // delete_* returns Ok(false) for tables that were never created
        write_txn.delete_table(RECORDS_TABLE)?;
        write_txn.delete_table(RECORDS_BY_DATE_TABLE)?;
        write_txn.delete_table(SETTINGS_TABLE)?;
        write_txn.delete_table(INSIGHTS_TABLE)?;
        write_txn.delete_multimap_table(INSIGHTS_BY_CREATED_TABLE)?;
        write_txn.delete_table(METADATA_TABLE)?;

        migration::create_layout(&write_txn, MIGRATIONS, self.metadata.schema_version)?;
        write_db_metadata(&write_txn, &self.metadata)?;

        write_txn.commit().map_err(StorageError::from)?;

        info!("All collections cleared");
        Ok(())
    }

    #[instrument(skip_all, fields(records = records.len()))]
    fn replace_records_and_settings(
        &self,
        records: &[Record],
        settings: &Settings,
        import_entry: &MetadataEntry,
    ) -> Result<()> {
        let mut encoded = Vec::with_capacity(records.len());
        for record in records {
            encoded.push(serde_json::to_vec(record)?);
        }
        let settings_bytes = serde_json::to_vec(settings)?;
        let entry_bytes = serde_json::to_vec(import_entry)?;

        let write_txn = self.begin_write()?;
        write_txn.delete_table(RECORDS_TABLE)?;
        write_txn.delete_table(RECORDS_BY_DATE_TABLE)?;
        {
            let mut table = write_txn.open_table(RECORDS_TABLE)?;
            let mut by_date = write_txn.open_table(RECORDS_BY_DATE_TABLE)?;
            for (record, bytes) in records.iter().zip(&encoded) {
                insert_record(
                    &mut table,
                    &mut by_date,
                    record.id.as_str(),
                    &record.date_iso,
                    bytes,
                )?;
            }

            let mut settings_table = write_txn.open_table(SETTINGS_TABLE)?;
            settings_table.insert(SETTINGS_KEY, settings_bytes.as_slice())?;

            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            meta_table.insert(LAST_IMPORT_KEY, entry_bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!("Records and settings replaced");
        Ok(())
    }
}

// RedbStorage is auto Send + Sync: Database, DatabaseMetadata, PathBuf and
// SyncMode are all Send + Sync.
