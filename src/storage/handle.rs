//! Process-wide connection cache.
//!
//! A [`StoreHandle`] owns at most one open [`RedbStorage`]. Callers get a
//! shared `Arc` from [`acquire`](StoreHandle::acquire); the handle reopens
//! the file when the cached connection's layout is behind the target, and
//! rebuilds the file from scratch when a wipe cannot be completed.
//!
//! # Lifecycle
//!
//! ```text
//!   empty ──acquire()──▶ open ──acquire(), layout behind──▶ reopen ──▶ open
//!                         │
//!                         ├──wipe() ok──▶ open (empty)
//!                         ├──wipe() fails──▶ delete file ──▶ open (fresh)
//!                         │                       │
//!                         │                       └─ fails ──▶ RecreateFailed
//!                         └──close()──▶ empty
//! ```
//!
//! The slot is guarded by a mutex that is held across the open itself, so
//! concurrent first callers share one open instead of racing for the file
//! lock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, instrument, warn};

use super::redb::RedbStorage;
use super::StorageEngine;
use crate::config::Config;
use crate::error::{ReflectDBError, Result, StorageError};

/// Lazily-opened, reopen-on-stale connection to one database file.
#[derive(Debug)]
pub struct StoreHandle {
    path: PathBuf,
    config: Config,
    slot: Mutex<Option<Arc<RedbStorage>>>,
}

impl StoreHandle {
    /// Creates a handle without opening the file.
    pub fn new(path: impl AsRef<Path>, config: Config) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            slot: Mutex::new(None),
        }
    }

    /// Creates a handle around an already-open connection.
    pub fn with_storage(storage: RedbStorage, config: Config) -> Self {
        let path = storage
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            path,
            config,
            slot: Mutex::new(Some(Arc::new(storage))),
        }
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Arc<RedbStorage>>>> {
        self.slot
            .lock()
            .map_err(|_| StorageError::transaction("Store handle lock poisoned").into())
    }

    /// Returns the open connection, opening or reopening it as needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DatabaseLocked` if the cached connection is
    /// stale but still held elsewhere, and any error from
    /// [`RedbStorage::open`].
    pub fn acquire(&self) -> Result<Arc<RedbStorage>> {
        let mut slot = self.lock()?;
        let target = self.config.target_schema_version;

        if let Some(store) = slot.as_ref() {
            if store.metadata().schema_version >= target {
                return Ok(Arc::clone(store));
            }
        }

        if let Some(stale) = slot.take() {
            info!(
                stored_version = stale.metadata().schema_version,
                target_version = target,
                "Reopening stale connection"
            );
            match Arc::try_unwrap(stale) {
                Ok(storage) => storage.close()?,
                Err(shared) => {
                    *slot = Some(shared);
                    return Err(StorageError::DatabaseLocked.into());
                }
            }
        }

        let store = Arc::new(RedbStorage::open(&self.path, &self.config)?);
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Empties every collection, rebuilding the file if that fails.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::RecreateFailed` if the file could not be
    /// rebuilt. That almost always means another instance holds it open.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn wipe(&self) -> Result<()> {
        let store = self.acquire()?;
        match store.clear_all() {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Clearing collections failed; recreating store");
                drop(store);
                self.recreate()
            }
        }
    }

    /// Deletes the database file and opens a fresh one in its place.
    pub(crate) fn recreate(&self) -> Result<()> {
        let mut slot = self.lock()?;

        if let Some(current) = slot.take() {
            match Arc::try_unwrap(current) {
                Ok(storage) => storage.close()?,
                Err(shared) => {
                    *slot = Some(shared);
                    return Err(recreate_failed("store is still in use"));
                }
            }
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(recreate_failed(e)),
        }

        let storage = RedbStorage::open(&self.path, &self.config).map_err(recreate_failed)?;
        warn!("Store recreated from scratch");
        *slot = Some(Arc::new(storage));
        Ok(())
    }

    /// Closes the cached connection, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DatabaseLocked` if the connection is still
    /// held elsewhere; it stays cached in that case.
    pub fn close(&self) -> Result<()> {
        let mut slot = self.lock()?;
        if let Some(current) = slot.take() {
            match Arc::try_unwrap(current) {
                Ok(storage) => storage.close()?,
                Err(shared) => {
                    *slot = Some(shared);
                    return Err(StorageError::DatabaseLocked.into());
                }
            }
        }
        Ok(())
    }

    /// Returns true if a connection is currently cached.
    pub fn is_open(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

fn recreate_failed(cause: impl ToString) -> ReflectDBError {
    StorageError::RecreateFailed(cause.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::storage::schema::INSIGHTS_BY_CREATED_TABLE;
    use crate::storage::SCHEMA_VERSION;
    use ::redb::TableDefinition;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_opens_once() {
        let dir = tempdir().unwrap();
        let handle = StoreHandle::new(dir.path().join("test.db"), Config::default());
        assert!(!handle.is_open());

        let a = handle.acquire().unwrap();
        let b = handle.acquire().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(handle.is_open());
    }

    #[test]
    fn test_concurrent_first_acquire_shares_one_open() {
        let dir = tempdir().unwrap();
        let handle = Arc::new(StoreHandle::new(
            dir.path().join("test.db"),
            Config::default(),
        ));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.acquire().unwrap())
            })
            .collect();
        let stores: Vec<Arc<RedbStorage>> =
            threads.into_iter().map(|t| t.join().unwrap()).collect();

        for store in &stores[1..] {
            assert!(Arc::ptr_eq(&stores[0], store));
        }
    }

    #[test]
    fn test_stale_connection_is_reopened() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let old = RedbStorage::open(
            &path,
            &Config {
                target_schema_version: 1,
                ..Default::default()
            },
        )
        .unwrap();
        old.put_record(&Record::new("2024-05-01")).unwrap();

        let handle = StoreHandle::with_storage(old, Config::default());
        let store = handle.acquire().unwrap();
        assert_eq!(store.metadata().schema_version, SCHEMA_VERSION);
        assert_eq!(store.count_records().unwrap(), 1);
    }

    #[test]
    fn test_stale_connection_held_elsewhere_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let old = RedbStorage::open(
            &path,
            &Config {
                target_schema_version: 1,
                ..Default::default()
            },
        )
        .unwrap();
        let stale_config = Config {
            target_schema_version: 1,
            ..Default::default()
        };
        let stale_handle = StoreHandle::with_storage(old, stale_config);
        let held = stale_handle.acquire().unwrap();

        // Same connection, newer target
        let handle = StoreHandle {
            path: path.clone(),
            config: Config::default(),
            slot: Mutex::new(Some(Arc::clone(&held))),
        };
        let err = handle.acquire().unwrap_err();
        assert!(matches!(
            err,
            ReflectDBError::Storage(StorageError::DatabaseLocked)
        ));
        assert!(handle.is_open());
    }

    #[test]
    fn test_wipe_clears_store() {
        let dir = tempdir().unwrap();
        let handle = StoreHandle::new(dir.path().join("test.db"), Config::default());

        handle
            .acquire()
            .unwrap()
            .put_record(&Record::new("2024-05-01"))
            .unwrap();
        handle.wipe().unwrap();
        assert_eq!(handle.acquire().unwrap().count_records().unwrap(), 0);
    }

    /// Swaps the insight-time multimap for a plain table of the same name.
    fn break_insight_index(store: &RedbStorage) {
        let write_txn = store.database().begin_write().unwrap();
        write_txn
            .delete_multimap_table(INSIGHTS_BY_CREATED_TABLE)
            .unwrap();
        {
            let mut table = write_txn
                .open_table(TableDefinition::<&str, &str>::new("insights_by_created"))
                .unwrap();
            table.insert("bogus", "entry").unwrap();
        }
        write_txn.commit().unwrap();
    }

    #[test]
    fn test_wipe_recreates_when_clear_fails() {
        let dir = tempdir().unwrap();
        let handle = StoreHandle::new(dir.path().join("test.db"), Config::default());

        let store = handle.acquire().unwrap();
        store.put_record(&Record::new("2024-05-01")).unwrap();
        break_insight_index(&store);
        assert!(store.clear_all().is_err());
        drop(store);

        handle.wipe().unwrap();

        let store = handle.acquire().unwrap();
        assert_eq!(store.count_records().unwrap(), 0);
        assert!(store.recent_insights(5).unwrap().is_empty());
    }

    #[test]
    fn test_recreate_replaces_file() {
        let dir = tempdir().unwrap();
        let handle = StoreHandle::new(dir.path().join("test.db"), Config::default());

        let store = handle.acquire().unwrap();
        store.put_record(&Record::new("2024-05-01")).unwrap();
        let created_at = store.metadata().created_at;
        drop(store);

        std::thread::sleep(std::time::Duration::from_millis(5));
        handle.recreate().unwrap();

        let store = handle.acquire().unwrap();
        assert_eq!(store.count_records().unwrap(), 0);
        assert!(store.metadata().created_at > created_at);
    }

    #[test]
    fn test_recreate_while_held_fails_distinctly() {
        let dir = tempdir().unwrap();
        let handle = StoreHandle::new(dir.path().join("test.db"), Config::default());

        let held = handle.acquire().unwrap();
        let err = handle.recreate().unwrap_err();
        assert!(err.is_fatal_store_lock());
        assert!(err.to_string().contains("Close other open instances"));

        // The held connection is still usable
        assert_eq!(held.count_records().unwrap(), 0);
    }

    #[test]
    fn test_close_then_acquire_reopens() {
        let dir = tempdir().unwrap();
        let handle = StoreHandle::new(dir.path().join("test.db"), Config::default());

        handle.acquire().unwrap();
        handle.close().unwrap();
        assert!(!handle.is_open());
        handle.acquire().unwrap();
        assert!(handle.is_open());
    }
}
