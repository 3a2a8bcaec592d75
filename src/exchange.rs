//! Bulk export and import.
//!
//! The export format is a versioned JSON document:
//!
//! ```text
//! { "version": 1, "exportedAt": "<RFC 3339>", "entries": [Record...], "settings": Settings }
//! ```
//!
//! Import treats the payload as untrusted. Every check that can reject it
//! runs before the store is touched; the write itself is one transaction
//! replacing records and settings together.
//!
//! ```text
//! payload ─► shape + version checks ─► transform ─► validate ─► dedupe ─► replace (1 txn)
//!                    │
//!                    └─ MissingEntries / IncompatibleVersion / Malformed: nothing written
//! ```

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::error::{ImportError, Result};
use crate::record::{load_records, load_settings, validate_records, Record};
use crate::settings::Settings;
use crate::storage::schema::EXPORTED_AT_KEY;
use crate::storage::{MetadataEntry, StorageEngine, DATA_VERSION};
use crate::transform::{
    get_safe_version, is_compatible_version, transform_records, transform_settings,
};
use crate::types::now_rfc3339;
use crate::validation::type_name;

/// A full snapshot of records and settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// Data version the entries were written under.
    pub version: u32,
    /// When the snapshot was taken (RFC 3339).
    pub exported_at: String,
    /// All records, newest date first.
    pub entries: Vec<Record>,
    /// The settings singleton.
    pub settings: Settings,
}

impl ExportDocument {
    /// Builds a document at the current data version, stamped now.
    pub fn new(entries: Vec<Record>, settings: Settings) -> Self {
        Self {
            version: DATA_VERSION,
            exported_at: now_rfc3339(),
            entries,
            settings,
        }
    }

    /// Serializes the document as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Outcome of a successful import.
///
/// `Display` renders the summary line shown to the user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Entries written to the store.
    pub imported: usize,
    /// Written entries that needed at least one correction.
    pub repaired: usize,
    /// Entries left out (not an object, or a date/id already taken earlier
    /// in the payload).
    pub skipped: usize,
    /// Every correction and every skip, described.
    pub warnings: Vec<String>,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Imported {} entries ({} repaired, {} skipped)",
            self.imported, self.repaired, self.skipped
        )
    }
}

/// An import payload that passed every check, ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedImport {
    /// Data version the payload advertised.
    pub version: u32,
    /// Records to store, in payload order.
    pub records: Vec<Record>,
    /// Settings to store.
    pub settings: Settings,
    /// Counts and diagnostics.
    pub summary: ImportSummary,
}

/// Parses import text into the untrusted representation.
///
/// # Errors
///
/// Returns [`ImportError::Malformed`] if the text is not JSON.
pub fn parse_payload(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| ImportError::malformed(e.to_string()).into())
}

/// Checks, transforms and validates a payload without touching any store.
///
/// # Errors
///
/// - [`ImportError::Malformed`] if the payload is not an object or
///   `entries` is not an array
/// - [`ImportError::MissingEntries`] if `entries` is absent or `null`
/// - [`ImportError::IncompatibleVersion`] if the advertised version is
///   newer than this build understands
pub fn prepare_import(payload: &Value) -> Result<PreparedImport> {
    let Value::Object(fields) = payload else {
        return Err(ImportError::malformed(format!(
            "expected object, got {}",
            type_name(payload)
        ))
        .into());
    };

    let entries = match fields.get("entries") {
        None | Some(Value::Null) => return Err(ImportError::MissingEntries.into()),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ImportError::malformed(format!(
                "entries must be an array, got {}",
                type_name(other)
            ))
            .into())
        }
    };

    let version = get_safe_version(fields.get("version"));
    if !is_compatible_version(version) {
        return Err(ImportError::IncompatibleVersion {
            found: version,
            supported: DATA_VERSION,
        }
        .into());
    }

    let transformed = transform_records(entries, version);
    let mut summary = ImportSummary {
        repaired: transformed.repaired,
        skipped: transformed.dropped,
        warnings: transformed.warnings,
        ..Default::default()
    };

    let mut values = Vec::with_capacity(transformed.records.len());
    for record in &transformed.records {
        values.push(serde_json::to_value(record)?);
    }
    let batch = validate_records(&values);
    summary.repaired += batch.repaired;
    summary.skipped += batch.invalid;
    summary.warnings.extend(batch.warnings);

    let mut dates = HashSet::new();
    let mut ids = HashSet::new();
    let mut records = Vec::with_capacity(batch.valid.len());
    for record in batch.valid {
        if !dates.insert(record.date_iso.clone()) {
            warn!(id = %record.id, date = %record.date_iso, "Skipping entry with duplicate date");
            summary.skipped += 1;
            summary.warnings.push(format!(
                "{}: date {} already imported; skipped",
                record.id, record.date_iso
            ));
            continue;
        }
        if !ids.insert(record.id.clone()) {
            warn!(id = %record.id, "Skipping entry with duplicate id");
            dates.remove(&record.date_iso);
            summary.skipped += 1;
            summary
                .warnings
                .push(format!("{}: id already imported; skipped", record.id));
            continue;
        }
        records.push(record);
    }
    summary.imported = records.len();

    let settings = transform_settings(fields.get("settings").unwrap_or(&Value::Null), version);
    for warning in &settings.warnings {
        warn!("Settings repaired on import: {}", warning);
    }
    summary
        .warnings
        .extend(settings.warnings.iter().map(|w| format!("settings: {}", w)));
    let settings = settings.data;

    Ok(PreparedImport {
        version,
        records,
        settings,
        summary,
    })
}

/// Replaces the store's records and settings with the payload's.
///
/// Nothing is written unless the payload passes [`prepare_import`]. The
/// replacement and the `lastImport` metadata entry commit together.
#[instrument(skip_all)]
pub fn import_payload(storage: &dyn StorageEngine, payload: &Value) -> Result<PreparedImport> {
    let prepared = prepare_import(payload)?;

    let entry = MetadataEntry::new(json!({
        "at": now_rfc3339(),
        "version": prepared.version,
        "imported": prepared.summary.imported,
        "repaired": prepared.summary.repaired,
        "skipped": prepared.summary.skipped,
    }));
    storage.replace_records_and_settings(&prepared.records, &prepared.settings, &entry)?;

    info!(
        imported = prepared.summary.imported,
        repaired = prepared.summary.repaired,
        skipped = prepared.summary.skipped,
        "Import committed"
    );
    Ok(prepared)
}

/// Snapshots every record and the settings, read through repair.
///
/// Records `exportedAt` in the metadata table.
#[instrument(skip_all)]
pub fn export_snapshot(storage: &dyn StorageEngine, write_back: bool) -> Result<ExportDocument> {
    let (mut records, report) = load_records(storage, write_back)?;
    if !report.is_clean() {
        warn!(
            repaired = report.repaired,
            unreadable = report.unreadable,
            skipped = report.skipped,
            "Export read repaired or unreadable records"
        );
    }
    records.sort_by(|a, b| b.date_iso.cmp(&a.date_iso));
    let (settings, _) = load_settings(storage, write_back)?;

    let document = ExportDocument::new(records, settings);
    storage.put_metadata(
        EXPORTED_AT_KEY,
        &MetadataEntry::new(Value::String(document.exported_at.clone())),
    )?;

    info!(entries = document.entries.len(), "Export snapshot taken");
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ReflectDBError;
    use crate::record::Section;
    use crate::storage::schema::LAST_IMPORT_KEY;
    use crate::storage::RedbStorage;
    use tempfile::{tempdir, TempDir};

    fn open() -> (TempDir, RedbStorage) {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.db"), &Config::default()).unwrap();
        (dir, storage)
    }

    fn import_error(result: Result<PreparedImport>) -> ImportError {
        match result {
            Err(ReflectDBError::Import(e)) => e,
            other => panic!("expected import error, got {:?}", other),
        }
    }

    #[test]
    fn test_summary_display() {
        let summary = ImportSummary {
            imported: 12,
            repaired: 2,
            skipped: 1,
            warnings: Vec::new(),
        };
        assert_eq!(
            summary.to_string(),
            "Imported 12 entries (2 repaired, 1 skipped)"
        );
    }

    #[test]
    fn test_rejects_missing_entries() {
        let err = import_error(prepare_import(&json!({ "version": 1 })));
        assert!(matches!(err, ImportError::MissingEntries));

        let err = import_error(prepare_import(&json!({ "version": 1, "entries": null })));
        assert!(matches!(err, ImportError::MissingEntries));
    }

    #[test]
    fn test_rejects_incompatible_version() {
        let err = import_error(prepare_import(&json!({ "version": 99, "entries": [] })));
        assert!(matches!(
            err,
            ImportError::IncompatibleVersion {
                found: 99,
                supported: DATA_VERSION
            }
        ));
    }

    #[test]
    fn test_rejects_malformed_shapes() {
        let err = import_error(prepare_import(&json!([1, 2])));
        assert!(matches!(err, ImportError::Malformed(_)));

        let err = import_error(prepare_import(&json!({ "entries": "all" })));
        assert!(matches!(err, ImportError::Malformed(_)));

        assert!(parse_payload("{ not json").unwrap_err().is_import());
    }

    #[test]
    fn test_missing_version_is_treated_as_one() {
        let prepared = prepare_import(&json!({ "entries": [] })).unwrap();
        assert_eq!(prepared.version, 1);
        assert_eq!(prepared.settings, Settings::default());
    }

    #[test]
    fn test_counts_repaired_and_skipped() {
        let payload = json!({
            "version": 1,
            "entries": [
                { "id": "a", "dateISO": "2024-05-01", "good": { "itemIds": ["fajr"] } },
                { "id": "b", "dateISO": "2024-05-02", "privacyLevel": "loud" },
                "not an entry",
                { "id": "c", "dateISO": "2024-05-01" },
                { "id": "a", "dateISO": "2024-05-03" }
            ],
            "settings": { "reminderTime": "07:15" }
        });
        let prepared = prepare_import(&payload).unwrap();

        let ids: Vec<&str> = prepared.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(prepared.summary.imported, 2);
        assert_eq!(prepared.summary.repaired, 1);
        assert_eq!(prepared.summary.skipped, 3);
        assert_eq!(
            (prepared.settings.reminder_hour, prepared.settings.reminder_minute),
            (7, 15)
        );
    }

    #[test]
    fn test_import_replaces_store() {
        let (_dir, storage) = open();
        storage.put_record(&Record::new("2023-01-01")).unwrap();

        let payload = json!({
            "version": 1,
            "entries": [{ "id": "a", "dateISO": "2024-05-01" }],
            "settings": { "privateMode": true }
        });
        let prepared = import_payload(&storage, &payload).unwrap();
        assert_eq!(prepared.summary.imported, 1);

        assert_eq!(storage.count_records().unwrap(), 1);
        assert!(storage.record_id_for_date("2023-01-01").unwrap().is_none());
        let (settings, _) = load_settings(&storage, false).unwrap();
        assert!(settings.private_mode);

        let last = storage.get_metadata(LAST_IMPORT_KEY).unwrap().unwrap();
        assert_eq!(last.value["imported"], json!(1));
    }

    #[test]
    fn test_rejected_import_leaves_store_untouched() {
        let (_dir, storage) = open();
        storage.put_record(&Record::new("2023-01-01")).unwrap();

        let payload = json!({ "version": 2, "entries": [] });
        assert!(import_payload(&storage, &payload).is_err());
        assert_eq!(storage.count_records().unwrap(), 1);
        assert!(storage.get_metadata(LAST_IMPORT_KEY).unwrap().is_none());
    }

    #[test]
    fn test_export_snapshot() {
        let (_dir, storage) = open();
        let mut older = Record::new("2024-05-01");
        older.good = Some(Section::with_items(["fajr"]));
        let newer = Record::new("2024-05-02");
        storage.put_record(&older).unwrap();
        storage.put_record(&newer).unwrap();

        let document = export_snapshot(&storage, true).unwrap();
        assert_eq!(document.version, DATA_VERSION);
        assert_eq!(document.entries, vec![newer, older]);
        assert_eq!(document.settings, Settings::default());

        let stamp = storage.get_metadata(EXPORTED_AT_KEY).unwrap().unwrap();
        assert_eq!(stamp.value, json!(document.exported_at));
    }

    #[test]
    fn test_export_reimports_cleanly() {
        let (_dir, storage) = open();
        storage.put_record(&Record::new("2024-05-01")).unwrap();
        let text = export_snapshot(&storage, true).unwrap().to_json().unwrap();

        let prepared = prepare_import(&parse_payload(&text).unwrap()).unwrap();
        assert_eq!(prepared.summary.imported, 1);
        assert_eq!(prepared.summary.repaired, 0);
        assert!(prepared.summary.warnings.is_empty());
    }
}
