//! Repair-on-read.
//!
//! The validator in [`super::validation`] is pure. This module is the one
//! place that pairs it with storage: stored bytes are decoded as untrusted
//! JSON, validated, and (when enabled) records that needed repair are
//! written back so the next read is clean.
//!
//! Write paths go through [`save_validated`] so nothing reaches the store
//! without passing the validator.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::record::types::Record;
use crate::record::validation::validate_record;
use crate::settings::{validate_settings, Settings};
use crate::storage::StorageEngine;
use crate::types::RecordId;
use crate::validation::ValidationReport;

/// What happened while loading from the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Values that needed at least one correction.
    pub repaired: usize,
    /// Values whose bytes could not be decoded at all.
    pub unreadable: usize,
    /// Repaired records left out because their date belongs to another record.
    pub skipped: usize,
    /// Human-readable description of every alteration.
    pub warnings: Vec<String>,
}

impl LoadReport {
    /// Returns true if nothing was altered or dropped.
    pub fn is_clean(&self) -> bool {
        self.repaired == 0 && self.unreadable == 0 && self.skipped == 0
    }
}

/// Validates one stored record, treating the storage key as its id.
fn repair_stored(key: &str, value: Value) -> ValidationReport<Record> {
    let mut key_warnings = Vec::new();
    let value = match value {
        Value::Object(mut map) => {
            if map.get("id").and_then(Value::as_str) != Some(key) {
                key_warnings.push(format!("id: restored from storage key '{}'", key));
                map.insert("id".to_string(), Value::String(key.to_string()));
            }
            Value::Object(map)
        }
        other => other,
    };

    let mut report = validate_record(&value);
    if report.data.id.as_str() != key {
        report.data.id = RecordId::new(key);
    }
    if !key_warnings.is_empty() {
        key_warnings.append(&mut report.warnings);
        report.warnings = key_warnings;
        report.repaired = true;
    }
    report
}

/// Loads every record through the validator.
///
/// Records stored in valid shape are returned untouched. Repaired records
/// are returned in their repaired shape and, if `write_back` is set,
/// persisted; a failed write-back becomes a warning, not an error.
///
/// # Errors
///
/// Returns an error only if the store cannot be read.
pub fn load_records(
    storage: &dyn StorageEngine,
    write_back: bool,
) -> Result<(Vec<Record>, LoadReport)> {
    let mut report = LoadReport::default();
    let mut clean = Vec::new();
    let mut fixed = Vec::new();

    for entry in storage.list_records_raw()? {
        let Some(value) = entry.value else {
            warn!(id = %entry.key, "Unreadable record skipped");
            report.unreadable += 1;
            report
                .warnings
                .push(format!("{}: stored bytes are not valid JSON; skipped", entry.key));
            continue;
        };

        let validated = repair_stored(&entry.key, value);
        if validated.repaired {
            fixed.push(validated);
        } else {
            clean.push(validated.data);
        }
    }

    let mut taken: HashSet<String> = clean.iter().map(|r| r.date_iso.clone()).collect();
    let mut records = clean;

    for validated in fixed {
        let record = validated.data;
        if !taken.insert(record.date_iso.clone()) {
            warn!(id = %record.id, date = %record.date_iso, "Repaired record collides on date");
            report.skipped += 1;
            report.warnings.push(format!(
                "{}: repaired date {} already belongs to another record; skipped",
                record.id, record.date_iso
            ));
            continue;
        }

        for warning in &validated.warnings {
            warn!(id = %record.id, "Repaired on read: {}", warning);
        }
        report.repaired += 1;
        report.warnings.extend(
            validated
                .warnings
                .into_iter()
                .map(|w| format!("{}: {}", record.id, w)),
        );

        if write_back {
            if let Err(e) = storage.put_record(&record) {
                warn!(id = %record.id, error = %e, "Repair not persisted");
                report
                    .warnings
                    .push(format!("{}: repair not persisted: {}", record.id, e));
            } else {
                debug!(id = %record.id, "Repair persisted");
            }
        }
        records.push(record);
    }

    Ok((records, report))
}

/// A single record loaded through the validator.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedRecord {
    /// The validated record and every alteration made to it.
    pub report: ValidationReport<Record>,
    /// True if a repaired record was written back to the store.
    pub persisted: bool,
}

/// Loads one record through the validator.
///
/// Returns `None` if the record does not exist or its bytes are unreadable.
/// A failed write-back is recorded as a warning and leaves `persisted`
/// false.
pub fn load_record(
    storage: &dyn StorageEngine,
    id: &RecordId,
    write_back: bool,
) -> Result<Option<LoadedRecord>> {
    let Some(entry) = storage.get_record_raw(id)? else {
        return Ok(None);
    };
    let Some(value) = entry.value else {
        warn!(id = %id, "Unreadable record");
        return Ok(None);
    };

    let mut report = repair_stored(&entry.key, value);
    let mut persisted = false;
    if report.repaired {
        for warning in &report.warnings {
            warn!(id = %id, "Repaired on read: {}", warning);
        }
        if write_back {
            match storage.put_record(&report.data) {
                Ok(()) => persisted = true,
                Err(e) => {
                    warn!(id = %id, error = %e, "Repair not persisted");
                    report.warnings.push(format!("repair not persisted: {}", e));
                }
            }
        }
    }
    Ok(Some(LoadedRecord { report, persisted }))
}

/// Loads the settings singleton through the validator.
///
/// Missing settings are created with defaults and persisted. Unreadable or
/// repaired settings are replaced and, if `write_back` is set, persisted.
pub fn load_settings(
    storage: &dyn StorageEngine,
    write_back: bool,
) -> Result<(Settings, LoadReport)> {
    let mut report = LoadReport::default();

    let Some(entry) = storage.get_settings_raw()? else {
        debug!("No settings stored; persisting defaults");
        let settings = Settings::default();
        storage.put_settings(&settings)?;
        return Ok((settings, report));
    };

    let validated = match entry.value {
        Some(value) => validate_settings(&value),
        None => {
            report.unreadable += 1;
            report
                .warnings
                .push("settings: stored bytes are not valid JSON; reset to defaults".to_string());
            ValidationReport::repaired_from(Settings::default(), Vec::new())
        }
    };

    let altered = validated.repaired || report.unreadable > 0;
    if validated.repaired {
        report.repaired += 1;
    }
    for warning in &validated.warnings {
        warn!("Settings repaired on read: {}", warning);
    }
    report
        .warnings
        .extend(validated.warnings.iter().map(|w| format!("settings: {}", w)));

    if altered && write_back {
        if let Err(e) = storage.put_settings(&validated.data) {
            warn!(error = %e, "Settings repair not persisted");
            report
                .warnings
                .push(format!("settings: repair not persisted: {}", e));
        }
    }

    Ok((validated.data, report))
}

/// Validates a record and writes the validated form.
///
/// Returns the validation report so callers can surface any repairs.
///
/// # Errors
///
/// Returns an error if the store rejects the write (including a date
/// already owned by another record).
pub fn save_validated(
    storage: &dyn StorageEngine,
    record: &Record,
) -> Result<ValidationReport<Record>> {
    let value = serde_json::to_value(record)?;
    let report = validate_record(&value);
    for warning in &report.warnings {
        warn!(id = %report.data.id, "Repaired on write: {}", warning);
    }
    storage.put_record(&report.data)?;
    Ok(report)
}

/// Validates settings and writes the validated form.
pub fn save_validated_settings(
    storage: &dyn StorageEngine,
    settings: &Settings,
) -> Result<ValidationReport<Settings>> {
    let value = serde_json::to_value(settings)?;
    let report = validate_settings(&value);
    for warning in &report.warnings {
        warn!("Settings repaired on write: {}", warning);
    }
    storage.put_settings(&report.data)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::record::Section;
    use crate::storage::schema::{RECORDS_TABLE, SETTINGS_KEY, SETTINGS_TABLE};
    use crate::storage::RedbStorage;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn open() -> (TempDir, RedbStorage) {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.db"), &Config::default()).unwrap();
        (dir, storage)
    }

    fn put_raw(storage: &RedbStorage, key: &str, value: &[u8]) {
        let write_txn = storage.database().begin_write().unwrap();
        {
            let mut table = write_txn.open_table(RECORDS_TABLE).unwrap();
            table.insert(key, value).unwrap();
        }
        write_txn.commit().unwrap();
    }

    #[test]
    fn test_clean_records_load_unchanged() {
        let (_dir, storage) = open();
        let mut record = Record::new("2024-05-01");
        record.good = Some(Section::with_items(["fajr"]).with_qty("fajr", 2));
        storage.put_record(&record).unwrap();

        let (records, report) = load_records(&storage, true).unwrap();
        assert_eq!(records, vec![record]);
        assert!(report.is_clean());
    }

    #[test]
    fn test_repaired_record_is_written_back() {
        let (_dir, storage) = open();
        let stale = json!({
            "id": "old-1",
            "dateISO": "2024-05-01",
            "good": { "itemIds": ["fajr", 7], "qty": { "fajr": -2 } },
            "privacyLevel": "secret"
        });
        put_raw(&storage, "old-1", stale.to_string().as_bytes());

        let (records, report) = load_records(&storage, true).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(report.repaired, 1);
        assert!(report.warnings.iter().all(|w| w.starts_with("old-1: ")));
        assert_eq!(
            records[0].good.as_ref().unwrap().item_ids,
            vec!["fajr".to_string()]
        );

        // Second load finds nothing left to repair
        let (again, report) = load_records(&storage, true).unwrap();
        assert_eq!(again, records);
        assert!(report.is_clean());
    }

    #[test]
    fn test_repair_without_write_back_repeats() {
        let (_dir, storage) = open();
        put_raw(
            &storage,
            "old-1",
            json!({ "id": "old-1", "dateISO": "2024-05-01", "privacyLevel": 3 })
                .to_string()
                .as_bytes(),
        );

        let (_, first) = load_records(&storage, false).unwrap();
        let (_, second) = load_records(&storage, false).unwrap();
        assert_eq!(first.repaired, 1);
        assert_eq!(second.repaired, 1);
    }

    #[test]
    fn test_storage_key_is_authoritative() {
        let (_dir, storage) = open();
        put_raw(
            &storage,
            "key-1",
            json!({ "id": "other", "dateISO": "2024-05-01" })
                .to_string()
                .as_bytes(),
        );

        let (records, report) = load_records(&storage, false).unwrap();
        assert_eq!(records[0].id.as_str(), "key-1");
        assert!(report.warnings[0].contains("restored from storage key"));
    }

    #[test]
    fn test_unreadable_bytes_are_counted() {
        let (_dir, storage) = open();
        put_raw(&storage, "torn", b"{\"id\":\"to");

        let (records, report) = load_records(&storage, true).unwrap();
        assert!(records.is_empty());
        assert_eq!(report.unreadable, 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_repaired_date_collision_is_skipped() {
        let (_dir, storage) = open();
        let owner = Record::new(crate::types::today_iso());
        storage.put_record(&owner).unwrap();
        // Bad date repairs to today, which is taken
        put_raw(
            &storage,
            "bad-date",
            json!({ "id": "bad-date", "dateISO": "yesterday" })
                .to_string()
                .as_bytes(),
        );

        let (records, report) = load_records(&storage, true).unwrap();
        assert_eq!(records, vec![owner]);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_load_record_single() {
        let (_dir, storage) = open();
        put_raw(
            &storage,
            "r1",
            json!({ "id": "r1", "dateISO": "2024-05-01", "dua": 5 })
                .to_string()
                .as_bytes(),
        );

        let loaded = load_record(&storage, &RecordId::new("r1"), true)
            .unwrap()
            .unwrap();
        assert!(loaded.report.repaired);
        assert!(loaded.persisted);
        assert!(loaded.report.data.dua.is_none());
        assert!(load_record(&storage, &RecordId::new("missing"), true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_load_record_collision_is_not_persisted() {
        let (_dir, storage) = open();
        let owner = Record::new(crate::types::today_iso());
        storage.put_record(&owner).unwrap();
        put_raw(
            &storage,
            "bad-date",
            json!({ "id": "bad-date", "dateISO": "yesterday" })
                .to_string()
                .as_bytes(),
        );

        let loaded = load_record(&storage, &RecordId::new("bad-date"), true)
            .unwrap()
            .unwrap();
        assert!(loaded.report.repaired);
        assert!(!loaded.persisted);
        assert!(loaded
            .report
            .warnings
            .iter()
            .any(|w| w.starts_with("repair not persisted")));
        assert_eq!(
            storage.record_id_for_date(&owner.date_iso).unwrap(),
            Some(owner.id)
        );
    }

    #[test]
    fn test_load_settings_persists_defaults() {
        let (_dir, storage) = open();
        let (settings, report) = load_settings(&storage, false).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(report.is_clean());
        assert!(storage.get_settings_raw().unwrap().is_some());
    }

    #[test]
    fn test_load_settings_repairs_bad_values() {
        let (_dir, storage) = open();
        let write_txn = storage.database().begin_write().unwrap();
        {
            let mut table = write_txn.open_table(SETTINGS_TABLE).unwrap();
            let bytes = json!({ "reminderHour": 42, "privateMode": true }).to_string();
            table.insert(SETTINGS_KEY, bytes.as_bytes()).unwrap();
        }
        write_txn.commit().unwrap();

        let (settings, report) = load_settings(&storage, true).unwrap();
        assert_eq!(settings.reminder_hour, 21);
        assert!(settings.private_mode);
        assert_eq!(report.repaired, 1);

        let (_, report) = load_settings(&storage, true).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_save_validated_repairs_before_writing() {
        let (_dir, storage) = open();
        let mut record = Record::new("not-a-date");
        record.dua = Some("d".repeat(6000));

        let report = save_validated(&storage, &record).unwrap();
        assert!(report.repaired);
        assert_eq!(report.data.dua.as_ref().unwrap().chars().count(), 5000);

        let (records, load) = load_records(&storage, true).unwrap();
        assert_eq!(records, vec![report.data]);
        assert!(load.is_clean());
    }
}
