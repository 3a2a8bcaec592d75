//! Integration tests for saving, updating and reading records.
//!
//! Tests the full stack: ReflectDB facade -> validator -> StorageEngine -> redb.

use reflectdb::storage::StorageEngine;
use reflectdb::{
    Config, Patch, PrivacyLevel, Record, RecordDraft, RecordId, ReflectDB, ReflectDBError, Section,
    ValidationError,
};
use tempfile::tempdir;

/// Helper to open a fresh store with default config.
fn open_db() -> (ReflectDB, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let db = ReflectDB::open(dir.path().join("test.db"), Config::default()).unwrap();
    (db, dir)
}

fn today() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}

// ============================================================================
// save_record
// ============================================================================

#[test]
fn test_fresh_record_creation() {
    let (db, _dir) = open_db();

    let record = db
        .save_record(RecordDraft::new().good(Section::with_items(["fajr"]).with_qty("fajr", 1)))
        .unwrap();

    assert!(!record.id.as_str().is_empty());
    assert_eq!(record.date_iso, today());
    assert_eq!(record.good.as_ref().unwrap().item_ids, vec!["fajr".to_string()]);
    assert!(record.improve.is_none());
    assert_eq!(db.records().unwrap(), vec![record.clone()]);
    assert_eq!(db.storage_for_test().unwrap().count_records().unwrap(), 1);
}

#[test]
fn test_merge_keeps_untouched_sections() {
    let (db, _dir) = open_db();
    let good = Section::with_items(["fajr", "charity"]).with_qty("charity", 3);
    let improve = Section::with_items(["anger"]).with_tawbah(true);

    db.save_record(RecordDraft::new().good(good.clone())).unwrap();
    let merged = db
        .save_record(RecordDraft::new().improve(improve.clone()))
        .unwrap();

    assert_eq!(merged.good, Some(good));
    assert_eq!(merged.improve, Some(improve));
    assert_eq!(db.records().unwrap().len(), 1);
}

#[test]
fn test_merge_replaces_section_wholesale() {
    let (db, _dir) = open_db();
    db.save_record(RecordDraft::new().good(Section::with_items(["fajr", "dhuhr"])))
        .unwrap();

    let merged = db
        .save_record(RecordDraft::new().good(Section::with_items(["asr"])))
        .unwrap();
    assert_eq!(merged.good, Some(Section::with_items(["asr"])));
}

#[test]
fn test_clear_and_privacy_patches() {
    let (db, _dir) = open_db();
    db.save_record(
        RecordDraft::new()
            .good(Section::with_items(["fajr"]))
            .dua("guide me"),
    )
    .unwrap();

    let record = db
        .save_record(RecordDraft {
            dua: Patch::Clear,
            privacy_level: Some(PrivacyLevel::HighlySensitive),
            ..Default::default()
        })
        .unwrap();
    assert!(record.dua.is_none());
    assert!(record.good.is_some());
    assert_eq!(record.privacy_level, PrivacyLevel::HighlySensitive);
}

#[test]
fn test_empty_section_is_stored_as_null() {
    let (db, _dir) = open_db();
    let record = db
        .save_record(RecordDraft::new().missed_opportunity(Section::default()))
        .unwrap();
    assert!(record.missed_opportunity.is_none());
}

#[test]
fn test_long_texts_truncated_on_save() {
    let (db, _dir) = open_db();
    let record = db
        .save_record(
            RecordDraft::new()
                .good(Section::with_items(["fajr"]).with_note("n".repeat(2500)))
                .dua("d".repeat(6000)),
        )
        .unwrap();
    assert_eq!(
        record.good.unwrap().note.unwrap().chars().count(),
        reflectdb::record::MAX_NOTE_LENGTH
    );
    assert_eq!(
        record.dua.unwrap().chars().count(),
        reflectdb::record::MAX_DUA_LENGTH
    );
}

#[test]
fn test_concurrent_saves_merge() {
    let (db, _dir) = open_db();
    let db = std::sync::Arc::new(db);

    let handles: Vec<_> = ["good", "improve", "severe", "missed"]
        .into_iter()
        .map(|slot| {
            let db = std::sync::Arc::clone(&db);
            std::thread::spawn(move || {
                let section = Section::with_items([slot]);
                let draft = match slot {
                    "good" => RecordDraft::new().good(section),
                    "improve" => RecordDraft::new().improve(section),
                    "severe" => RecordDraft::new().severe_slip(section),
                    _ => RecordDraft::new().missed_opportunity(section),
                };
                db.save_record(draft).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let records = db.records().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].sections().iter().all(|(_, s)| s.is_some()));
}

// ============================================================================
// update_record / reads
// ============================================================================

#[test]
fn test_update_record_moves_date() {
    let (db, _dir) = open_db();
    let saved = db
        .save_record(RecordDraft::new().good(Section::with_items(["fajr"])))
        .unwrap();

    let mut moved = saved.clone();
    moved.date_iso = "2020-01-01".to_string();
    db.update_record(moved).unwrap();

    assert!(db.get_record_for_date(&today()).unwrap().is_none());
    let store = db.storage_for_test().unwrap();
    assert_eq!(store.record_id_for_date("2020-01-01").unwrap(), Some(saved.id));
    assert!(store.record_id_for_date(&today()).unwrap().is_none());
}

#[test]
fn test_update_onto_taken_date_is_rejected() {
    let (db, _dir) = open_db();
    let saved = db
        .save_record(RecordDraft::new().good(Section::with_items(["fajr"])))
        .unwrap();

    let other = Record::new("2020-01-01");
    db.storage_for_test().unwrap().put_record(&other).unwrap();

    let mut clash = other.clone();
    clash.date_iso = saved.date_iso.clone();
    let err = db.update_record(clash).unwrap_err();
    match err {
        ReflectDBError::Validation(ValidationError::DuplicateDate { date, existing }) => {
            assert_eq!(date, saved.date_iso);
            assert_eq!(existing, saved.id.to_string());
        }
        other => panic!("expected duplicate date, got {other:?}"),
    }
    assert_eq!(db.records().unwrap(), vec![saved]);
}

#[test]
fn test_update_missing_record() {
    let (db, _dir) = open_db();
    let err = db.update_record(Record::new("2020-01-01")).unwrap_err();
    assert!(err.is_not_found());
    assert!(db.records().unwrap().is_empty());
}

#[test]
fn test_get_record_by_id() {
    let (db, _dir) = open_db();
    let saved = db
        .save_record(RecordDraft::new().good(Section::with_items(["fajr"])))
        .unwrap();

    assert_eq!(db.get_record(&saved.id).unwrap(), Some(saved));
    assert_eq!(db.get_record(&RecordId::new("unknown")).unwrap(), None);
}
