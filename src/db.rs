//! ReflectDB main struct and lifecycle operations.
//!
//! The [`ReflectDB`] struct is the single entry point the application calls.
//! It provides methods for:
//!
//! - Opening and closing the store
//! - Saving today's record (merge) and replacing records by id
//! - Reading and updating settings
//! - Wiping everything
//! - Exporting and importing snapshots
//! - Storing and requesting derived insights
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use reflectdb::{Config, RecordDraft, ReflectDB, Section};
//!
//! // Open or create a store
//! let db = ReflectDB::open("./reflect.db", Config::default())?;
//!
//! // Record today's good deeds
//! db.save_record(RecordDraft::new().good(Section::with_items(["fajr"]).with_qty("fajr", 1)))?;
//!
//! // Later the same day: add to it, `good` is kept
//! db.save_record(RecordDraft::new().improve(Section::with_items(["anger"])))?;
//!
//! // Close when done
//! db.close()?;
//! ```
//!
//! # Mirror
//!
//! Records and settings are held in memory, newest date first, so
//! [`get_record_for_date`](ReflectDB::get_record_for_date) and
//! [`records`](ReflectDB::records) never touch the store. Every write goes
//! to the store first; the mirror only changes once the write committed.
//!
//! # Thread Safety
//!
//! `ReflectDB` is `Send + Sync`. Writes that read-modify-write the mirror
//! hold one store-wide lock for their whole duration, so concurrent saves
//! for the same day never lose each other's sections.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::{NotFoundError, ReflectDBError, Result, StorageError};
use crate::exchange::{
    export_snapshot, import_payload, parse_payload, ExportDocument, ImportSummary,
};
use crate::insight::{
    validate_new_insight, DerivedInsight, InsightProvider, InsightRequest, NewInsight,
};
use crate::record::{
    load_record, load_records, load_settings, save_validated, save_validated_settings, Record,
    RecordDraft,
};
use crate::settings::{Settings, SettingsUpdate};
use crate::storage::schema::{
    DB_METADATA_KEY, MAX_INSIGHT_CONTENT_LENGTH, MAX_INSIGHT_SUBJECT_LENGTH,
};
use crate::storage::{DatabaseMetadata, MetadataEntry, RedbStorage, StorageEngine, StoreHandle};
use crate::types::{today_iso, InsightId, RecordId, Timestamp};
use crate::validation::truncate_chars;

/// In-memory copy of records and settings.
#[derive(Debug, Default)]
struct Mirror {
    /// Sorted by `date_iso`, newest first.
    records: Vec<Record>,
    settings: Settings,
}

impl Mirror {
    fn upsert(&mut self, record: Record) {
        self.records.retain(|r| r.id != record.id);
        self.records.push(record);
        sort_newest_first(&mut self.records);
    }
}

fn sort_newest_first(records: &mut [Record]) {
    records.sort_by(|a, b| b.date_iso.cmp(&a.date_iso));
}

/// The main ReflectDB handle.
///
/// Create an instance with [`ReflectDB::open()`] and close it with
/// [`ReflectDB::close()`].
pub struct ReflectDB {
    /// Lazily reopened connection to the store file.
    handle: StoreHandle,

    /// Records and settings as last committed.
    mirror: Mutex<Mirror>,

    /// Configuration used to open this store.
    config: Config,
}

impl std::fmt::Debug for ReflectDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectDB")
            .field("path", &self.handle.path())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReflectDB {
    /// Opens or creates a store at the specified path.
    ///
    /// Runs any pending schema migrations, probes the store with a read,
    /// loads every record through repair-on-read and loads settings
    /// (persisting defaults on first run).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration is invalid (see [`Config::validate`])
    /// - The file is locked by another open instance
    /// - The file was written by a newer build (schema version mismatch)
    /// - The file is corrupted
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use reflectdb::{Config, ReflectDB, SyncMode};
    ///
    /// let db = ReflectDB::open("./reflect.db", Config {
    ///     sync_mode: SyncMode::Paranoid,
    ///     ..Default::default()
    /// })?;
    /// ```
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate().map_err(ReflectDBError::from)?;

        info!("Opening ReflectDB");

        let handle = StoreHandle::new(path, config.clone());
        let store = handle.acquire()?;
        store.health_check()?;

        let (mut records, report) = load_records(&*store, config.repair_on_read)?;
        sort_newest_first(&mut records);
        let (settings, settings_report) = load_settings(&*store, config.repair_on_read)?;
        drop(store);

        info!(
            records = records.len(),
            repaired = report.repaired + settings_report.repaired,
            unreadable = report.unreadable + settings_report.unreadable,
            skipped = report.skipped,
            sync_mode = ?config.sync_mode,
            "ReflectDB opened successfully"
        );

        Ok(Self {
            handle,
            mirror: Mutex::new(Mirror { records, settings }),
            config,
        })
    }

    /// Closes the store.
    ///
    /// Consumes the `ReflectDB` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is still held by another thread.
    #[instrument(skip(self))]
    pub fn close(self) -> Result<()> {
        info!("Closing ReflectDB");
        self.handle.close()?;
        info!("ReflectDB closed successfully");
        Ok(())
    }

    /// Returns the configuration this store was opened with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the database metadata (schema version and timestamps).
    pub fn metadata(&self) -> Result<DatabaseMetadata> {
        Ok(self.store()?.metadata().clone())
    }

    fn store(&self) -> Result<Arc<RedbStorage>> {
        self.handle.acquire()
    }

    /// Returns the underlying store, bypassing the mirror.
    ///
    /// For integration tests that need to plant or inspect raw data.
    #[doc(hidden)]
    pub fn storage_for_test(&self) -> Result<Arc<RedbStorage>> {
        self.store()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Mirror>> {
        self.mirror
            .lock()
            .map_err(|_| StorageError::transaction("Mirror lock poisoned").into())
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Saves a draft into today's record.
    ///
    /// If a record for today exists, the draft is merged onto it: every
    /// field the draft sets replaces the stored one, every other field is
    /// kept. Otherwise a new record is created with a fresh id and today's
    /// date.
    ///
    /// Returns the record as stored (after validation).
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let record = db.save_record(
    ///     RecordDraft::new().good(Section::with_items(["fajr"]).with_qty("fajr", 1)),
    /// )?;
    /// assert!(record.improve.is_none());
    /// ```
    pub fn save_record(&self, draft: RecordDraft) -> Result<Record> {
        let mut mirror = self.lock()?;

        let today = today_iso();
        let mut record = mirror
            .records
            .iter()
            .find(|r| r.date_iso == today)
            .cloned()
            .unwrap_or_else(|| Record::new(today));
        record.apply(draft);

        let store = self.store()?;
        let report = save_validated(&*store, &record)?;
        mirror.upsert(report.data.clone());
        Ok(report.data)
    }

    /// Replaces a record by id, wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError::Record`] if no record has this id, and
    /// [`ValidationError::DuplicateDate`](crate::ValidationError::DuplicateDate)
    /// if the record moves onto a date another record owns.
    pub fn update_record(&self, record: Record) -> Result<Record> {
        let mut mirror = self.lock()?;

        let store = self.store()?;
        if store.get_record_raw(&record.id)?.is_none() {
            return Err(NotFoundError::record(&record.id).into());
        }
        let report = save_validated(&*store, &record)?;
        mirror.upsert(report.data.clone());
        Ok(report.data)
    }

    /// Returns the record for a date from the mirror.
    pub fn get_record_for_date(&self, date_iso: &str) -> Result<Option<Record>> {
        let mirror = self.lock()?;
        Ok(mirror
            .records
            .iter()
            .find(|r| r.date_iso == date_iso)
            .cloned())
    }

    /// Reads a record from the store, repairing it if needed.
    ///
    /// A repair is written back (and shown in the mirror) only when
    /// `repair_on_read` is enabled and the store accepted it. A repaired
    /// date that another record owns is returned but not persisted.
    pub fn get_record(&self, id: &RecordId) -> Result<Option<Record>> {
        if !self.config.repair_on_read {
            let store = self.store()?;
            return Ok(load_record(&*store, id, false)?.map(|loaded| loaded.report.data));
        }

        let mut mirror = self.lock()?;
        let store = self.store()?;
        let Some(loaded) = load_record(&*store, id, true)? else {
            return Ok(None);
        };

        let record = loaded.report.data;
        let date_taken = mirror
            .records
            .iter()
            .any(|r| r.date_iso == record.date_iso && r.id != record.id);
        if loaded.persisted && !date_taken {
            mirror.upsert(record.clone());
        }
        Ok(Some(record))
    }

    /// Returns every record, newest date first.
    pub fn records(&self) -> Result<Vec<Record>> {
        Ok(self.lock()?.records.clone())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Returns the current settings.
    pub fn settings(&self) -> Result<Settings> {
        Ok(self.lock()?.settings)
    }

    /// Applies a partial update to the settings.
    ///
    /// Out-of-range values are reset to their defaults before storing.
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<Settings> {
        let mut mirror = self.lock()?;

        let merged = mirror.settings.merged(&update);
        let store = self.store()?;
        let report = save_validated_settings(&*store, &merged)?;
        mirror.settings = report.data;
        Ok(report.data)
    }

    /// Deletes every record, insight and metadata entry, then stores
    /// default settings.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::RecreateFailed` if the store could not be
    /// emptied or rebuilt; the message asks the user to close other open
    /// instances and retry.
    #[instrument(skip(self))]
    pub fn clear_all(&self) -> Result<()> {
        let mut mirror = self.lock()?;

        self.handle.wipe()?;
        *mirror = Mirror::default();

        let store = self.store()?;
        store.put_settings(&Settings::default())?;

        info!("All data cleared");
        Ok(())
    }

    // =========================================================================
    // Export / import
    // =========================================================================

    /// Snapshots all records and settings.
    pub fn export(&self) -> Result<ExportDocument> {
        let _mirror = self.lock()?;
        let store = self.store()?;
        export_snapshot(&*store, self.config.repair_on_read)
    }

    /// Snapshots all records and settings as pretty-printed JSON.
    pub fn export_json(&self) -> Result<String> {
        self.export()?.to_json()
    }

    /// Replaces all records and settings with the document's.
    ///
    /// The document is checked like untrusted input.
    pub fn import(&self, document: &ExportDocument) -> Result<ImportSummary> {
        let payload = serde_json::to_value(document)?;
        self.import_value(&payload)
    }

    /// Replaces all records and settings with those in a JSON export.
    ///
    /// # Errors
    ///
    /// Returns an [`ImportError`](crate::ImportError) if the text is not
    /// JSON, has no `entries`, or advertises an unsupported version. The
    /// store is untouched in every such case.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let summary = db.import_json(&std::fs::read_to_string("backup.json")?)?;
    /// println!("{summary}"); // Imported 12 entries (1 repaired, 0 skipped)
    /// ```
    pub fn import_json(&self, text: &str) -> Result<ImportSummary> {
        let payload = parse_payload(text)?;
        self.import_value(&payload)
    }

    fn import_value(&self, payload: &Value) -> Result<ImportSummary> {
        let mut mirror = self.lock()?;

        let store = self.store()?;
        let prepared = import_payload(&*store, payload)?;

        let mut records = prepared.records;
        sort_newest_first(&mut records);
        *mirror = Mirror {
            records,
            settings: prepared.settings,
        };
        Ok(prepared.summary)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Stores a metadata value, e.g. `lastSync`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for the reserved key `db_metadata`.
    pub fn set_metadata(&self, key: &str, value: Value) -> Result<()> {
        self.store()?.put_metadata(key, &MetadataEntry::new(value))
    }

    /// Reads a metadata value.
    pub fn get_metadata(&self, key: &str) -> Result<Option<MetadataEntry>> {
        if key == DB_METADATA_KEY {
            return Ok(None);
        }
        self.store()?.get_metadata(key)
    }

    /// Lists every metadata entry.
    pub fn list_metadata(&self) -> Result<Vec<(String, MetadataEntry)>> {
        self.store()?.list_metadata()
    }

    // =========================================================================
    // Insights
    // =========================================================================

    /// Stores a derived insight.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the content is empty or too long, or
    /// the subject is too long.
    pub fn store_insight(&self, insight: NewInsight) -> Result<InsightId> {
        Ok(self.insert_insight(insight)?.id)
    }

    fn insert_insight(&self, insight: NewInsight) -> Result<DerivedInsight> {
        validate_new_insight(&insight)?;

        let stored = DerivedInsight {
            id: InsightId::new(),
            kind: insight.kind,
            subject: insight.subject,
            content: insight.content,
            created_at: Timestamp::now(),
        };
        self.store()?.put_insight(&stored)?;
        info!(id = %stored.id, kind = ?stored.kind, "Insight stored");
        Ok(stored)
    }

    /// Reads an insight by id.
    pub fn get_insight(&self, id: InsightId) -> Result<Option<DerivedInsight>> {
        self.store()?.get_insight(id)
    }

    /// Returns the newest insights first.
    ///
    /// `None` uses [`Config::recent_insights_limit`].
    pub fn recent_insights(&self, limit: Option<usize>) -> Result<Vec<DerivedInsight>> {
        let limit = limit.unwrap_or(self.config.recent_insights_limit);
        self.store()?.recent_insights(limit)
    }

    /// Deletes an insight.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError::Insight`] if no insight has this id.
    pub fn delete_insight(&self, id: InsightId) -> Result<()> {
        if !self.store()?.delete_insight(id)? {
            return Err(NotFoundError::insight(id).into());
        }
        Ok(())
    }

    /// Asks the insight service for guidance and stores the answer.
    ///
    /// Returns `Ok(None)` when the service fails or answers with nothing;
    /// availability of the service never turns into an error here.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let records = db.records()?;
    /// let request = InsightRequest::period(records.iter().take(7), "2024-W23");
    /// match db.request_insight(&provider, request)? {
    ///     Some(insight) => show(&insight.content),
    ///     None => show_unavailable_notice(),
    /// }
    /// ```
    pub fn request_insight(
        &self,
        provider: &dyn InsightProvider,
        request: InsightRequest,
    ) -> Result<Option<DerivedInsight>> {
        let content = match provider.generate(&request) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, kind = ?request.kind(), "Insight service unavailable");
                return Ok(None);
            }
        };
        if content.trim().is_empty() {
            warn!(kind = ?request.kind(), "Insight service returned no content");
            return Ok(None);
        }

        let (subject, _) = truncate_chars(request.subject(), MAX_INSIGHT_SUBJECT_LENGTH);
        let (content, cut) = truncate_chars(&content, MAX_INSIGHT_CONTENT_LENGTH);
        if cut {
            warn!(max = MAX_INSIGHT_CONTENT_LENGTH, "Insight content truncated");
        }

        let stored = self.insert_insight(NewInsight {
            kind: request.kind(),
            subject,
            content,
        })?;
        Ok(Some(stored))
    }
}

// ReflectDB is auto Send + Sync: StoreHandle, Mutex<Mirror> and Config are
// all Send + Sync.
