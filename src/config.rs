//! Configuration types for ReflectDB.
//!
//! The [`Config`] struct controls database behavior including:
//! - Durability of write transactions
//! - Whether records repaired on load are written back
//! - The on-disk layout version to upgrade to
//! - How many insights are returned by default
//!
//! # Example
//! ```rust
//! use reflectdb::{Config, SyncMode};
//!
//! // Use defaults
//! let config = Config::default();
//!
//! // Faster writes for tests or throwaway stores
//! let config = Config {
//!     sync_mode: SyncMode::Fast,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::storage::SCHEMA_VERSION;

/// Database configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use reflectdb::Config;
///
/// let config = Config {
///     repair_on_read: false,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Durability mode for write operations.
    pub sync_mode: SyncMode,

    /// Write records that were repaired during load back to the store.
    ///
    /// When false, repairs only live in memory and are redone on every open.
    /// Default: true
    pub repair_on_read: bool,

    /// Layout version the store is upgraded to on open.
    ///
    /// Must be in `1..=SCHEMA_VERSION`. Lower values are mostly useful for
    /// exercising upgrades.
    /// Default: [`SCHEMA_VERSION`]
    pub target_schema_version: u32,

    /// Number of insights returned by
    /// [`ReflectDB::recent_insights`](crate::ReflectDB::recent_insights)
    /// when no limit is given.
    /// Default: 20
    pub recent_insights_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::Normal,
            repair_on_read: true,
            target_schema_version: SCHEMA_VERSION,
            recent_insights_limit: 20,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `ReflectDB::open()`. You can also call this
    /// explicitly to check configuration before attempting to open.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - `target_schema_version` is 0 or newer than this build supports
    /// - `recent_insights_limit` is 0
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=SCHEMA_VERSION).contains(&self.target_schema_version) {
            return Err(ValidationError::invalid_field(
                "target_schema_version",
                format!("must be between 1 and {}", SCHEMA_VERSION),
            ));
        }

        if self.recent_insights_limit == 0 {
            return Err(ValidationError::invalid_field(
                "recent_insights_limit",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Durability mode for write operations.
///
/// Controls the trade-off between write performance and crash safety.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Sync to disk on transaction commit.
    ///
    /// This is the default and recommended setting.
    #[default]
    Normal,

    /// Async sync (faster writes, may lose recent data on crash).
    ///
    /// Committed transactions stay atomic; only the most recent ones may be
    /// rolled back after a crash.
    Fast,

    /// Two-phase commit on every transaction (slowest, maximum durability).
    Paranoid,
}

impl SyncMode {
    /// Returns true if this mode uses two-phase commits.
    pub fn is_paranoid(&self) -> bool {
        matches!(self, Self::Paranoid)
    }

    /// Returns true if this mode is async (may lose data on crash).
    pub fn is_fast(&self) -> bool {
        matches!(self, Self::Fast)
    }

    /// The redb durability applied to every write transaction.
    pub(crate) fn durability(&self) -> redb::Durability {
        match self {
            Self::Normal => redb::Durability::Immediate,
            Self::Fast => redb::Durability::Eventual,
            Self::Paranoid => redb::Durability::Paranoid,
        }
    }
}
