#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use reflectdb::{Config, ReflectDB};
use tempfile::TempDir;

static DB: OnceLock<(TempDir, ReflectDB)> = OnceLock::new();

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let (_dir, db) = DB.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let db = ReflectDB::open(dir.path().join("fuzz.db"), Config::default()).unwrap();
        (dir, db)
    });

    let before = db.records().unwrap();
    match db.import_json(text) {
        Ok(summary) => assert_eq!(db.records().unwrap().len(), summary.imported),
        // Rejected imports never touch the store
        Err(e) => {
            assert!(e.is_import(), "unexpected error: {e}");
            assert_eq!(db.records().unwrap(), before);
        }
    }
});
