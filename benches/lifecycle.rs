//! Benchmarks for ReflectDB lifecycle operations.
//!
//! Run with: `cargo bench`
//!
//! Performance targets:
//! - `open()` < 100ms for a new store
//! - `open()` < 100ms for an existing store with 10 years of daily records
//! - `save_record()` < 10ms
//! - `import_json()` of 10 years of records < 500ms

use criterion::{criterion_group, criterion_main, Criterion};
use reflectdb::storage::{RedbStorage, StorageEngine};
use reflectdb::{Config, Record, RecordDraft, ReflectDB, Section};
use serde_json::json;
use tempfile::tempdir;

/// Ten years of daily records.
const YEARS_OF_DAYS: usize = 3650;

/// Maps a day number to a unique `YYYY-MM-DD` date (28-day months).
fn dated(day: usize) -> String {
    let year = 2000 + day / 336;
    let day_of_year = day % 336;
    format!("{:04}-{:02}-{:02}", year, day_of_year / 28 + 1, day_of_year % 28 + 1)
}

fn sample_record(day: usize) -> Record {
    let mut record = Record::new(dated(day));
    record.good = Some(Section::with_items(["fajr", "charity"]).with_qty("charity", 2));
    record.improve = Some(Section::with_items(["anger"]).with_tawbah(true));
    record
}

/// Benchmark opening a new store.
fn bench_open_new(c: &mut Criterion) {
    c.bench_function("open_new_store", |b| {
        b.iter_custom(|iters| {
            let mut total = std::time::Duration::ZERO;

            for _ in 0..iters {
                let dir = tempdir().unwrap();
                let path = dir.path().join("test.db");

                let start = std::time::Instant::now();
                let db = ReflectDB::open(&path, Config::default()).unwrap();
                total += start.elapsed();

                db.close().unwrap();
            }

            total
        });
    });
}

/// Benchmark opening an existing store full of records.
fn bench_open_existing(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    {
        let storage = RedbStorage::open(&path, &Config::default()).unwrap();
        for day in 0..YEARS_OF_DAYS {
            storage.put_record(&sample_record(day)).unwrap();
        }
        storage.close().unwrap();
    }

    c.bench_function("open_existing_store", |b| {
        b.iter(|| {
            let db = ReflectDB::open(&path, Config::default()).unwrap();
            db.close().unwrap();
        });
    });
}

/// Benchmark merging a draft into today's record.
fn bench_save_record(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let db = ReflectDB::open(dir.path().join("test.db"), Config::default()).unwrap();

    c.bench_function("save_record_merge", |b| {
        b.iter(|| {
            db.save_record(RecordDraft::new().good(Section::with_items(["fajr"])))
                .unwrap();
        });
    });
}

/// Benchmark replacing the whole store from an export.
fn bench_import(c: &mut Criterion) {
    let entries: Vec<_> = (0..YEARS_OF_DAYS)
        .map(|day| {
            let mut value = serde_json::to_value(sample_record(day)).unwrap();
            value["id"] = json!(format!("r{}", day));
            value
        })
        .collect();
    let payload = json!({ "version": 1, "entries": entries, "settings": {} }).to_string();

    let dir = tempdir().unwrap();
    let db = ReflectDB::open(dir.path().join("test.db"), Config::default()).unwrap();

    c.bench_function("import_ten_years", |b| {
        b.iter(|| {
            db.import_json(&payload).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_open_new,
    bench_open_existing,
    bench_save_record,
    bench_import
);
criterion_main!(benches);
