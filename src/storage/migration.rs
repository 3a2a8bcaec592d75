//! Schema version registry.
//!
//! Every on-disk layout change is a [`Migration`] registered in
//! [`MIGRATIONS`] under the version it produces. Opening a store whose
//! stored version is `s` with target `t` runs every step with
//! `s < version <= t`, in ascending order, inside the caller's write
//! transaction. A fresh store has stored version 0, so initialization is
//! just the full chain.
//!
//! Steps must be idempotent with respect to table creation: redb's
//! `open_table` on a write transaction creates the table if missing and is
//! a no-op otherwise.

use ::redb::WriteTransaction;
use tracing::{debug, info};

use crate::error::Result;

use super::schema::{
    INSIGHTS_BY_CREATED_TABLE, INSIGHTS_TABLE, METADATA_TABLE, RECORDS_BY_DATE_TABLE,
    RECORDS_TABLE, SETTINGS_TABLE,
};

/// A single upgrade step.
#[derive(Clone, Copy)]
pub struct Migration {
    /// Layout version produced by this step.
    pub version: u32,
    /// Short human-readable summary, logged when the step runs.
    pub description: &'static str,
    /// Applies the step inside an open write transaction.
    pub apply: fn(&WriteTransaction) -> Result<()>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// All registered steps, ascending by version.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create metadata, records, records_by_date and settings",
        apply: create_core_tables,
    },
    Migration {
        version: 2,
        description: "create insights and insights_by_created",
        apply: create_insight_tables,
    },
];

fn create_core_tables(txn: &WriteTransaction) -> Result<()> {
    let _ = txn.open_table(METADATA_TABLE)?;
    let _ = txn.open_table(RECORDS_TABLE)?;
    let _ = txn.open_table(RECORDS_BY_DATE_TABLE)?;
    let _ = txn.open_table(SETTINGS_TABLE)?;
    Ok(())
}

fn create_insight_tables(txn: &WriteTransaction) -> Result<()> {
    let _ = txn.open_table(INSIGHTS_TABLE)?;
    let _ = txn.open_multimap_table(INSIGHTS_BY_CREATED_TABLE)?;
    Ok(())
}

/// Returns the steps that move a store from `from` to `to`, ascending.
pub fn pending(steps: &[Migration], from: u32, to: u32) -> Vec<&Migration> {
    let mut selected: Vec<&Migration> = steps
        .iter()
        .filter(|m| m.version > from && m.version <= to)
        .collect();
    selected.sort_by_key(|m| m.version);
    selected
}

/// Runs the pending steps inside `txn` and returns how many were applied.
///
/// Stops at the first failing step. The caller must not commit `txn` in
/// that case; dropping it rolls every step back.
pub(crate) fn apply_pending(
    txn: &WriteTransaction,
    steps: &[Migration],
    from: u32,
    to: u32,
) -> Result<usize> {
    let selected = pending(steps, from, to);
    for step in &selected {
        info!(
            version = step.version,
            description = step.description,
            "Applying schema migration"
        );
        (step.apply)(txn)?;
    }
    Ok(selected.len())
}

/// Recreates every table of layout `version` inside `txn`.
///
/// Used after a wipe, where the tables were dropped but the layout
/// version itself did not change.
pub(crate) fn create_layout(
    txn: &WriteTransaction,
    steps: &[Migration],
    version: u32,
) -> Result<()> {
    for step in pending(steps, 0, version) {
        debug!(version = step.version, "Recreating tables");
        (step.apply)(txn)?;
    }
    Ok(())
}
