//! Error types for ReflectDB.
//!
//! ReflectDB uses a hierarchical error system:
//! - `ReflectDBError` is the top-level error returned by all public APIs
//! - Specific error types (`StorageError`, `ValidationError`, `ImportError`)
//!   provide detail
//!
//! Shape problems in record or settings data are *not* errors. They are
//! repaired and reported as warnings in a
//! [`ValidationReport`](crate::ValidationReport). Errors are reserved for
//! an unavailable store, a rejected import payload, or a write that would
//! break a store-level constraint.
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use reflectdb::{ReflectDB, Config, Result};
//!
//! fn example() -> Result<()> {
//!     let db = ReflectDB::open("./journal.db", Config::default())?;
//!     // ... operations that may fail ...
//!     db.close()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias for ReflectDB operations.
pub type Result<T> = std::result::Result<T, ReflectDBError>;

/// Top-level error enum for all ReflectDB operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum ReflectDBError {
    /// Storage layer error (I/O, corruption, transactions, locking).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Import payload was rejected before any mutation.
    #[error("Import rejected: {0}")]
    Import(#[from] ImportError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// Requested entity not found.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The insight provider failed or returned unusable output.
    #[error("Insight error: {0}")]
    Insight(String),
}

impl ReflectDBError {
    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates an insight error with the given message.
    pub fn insight(msg: impl Into<String>) -> Self {
        Self::Insight(msg.into())
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is a rejected import.
    pub fn is_import(&self) -> bool {
        matches!(self, Self::Import(_))
    }

    /// Returns true if the store could not be recreated after a failed wipe.
    ///
    /// This is the one storage failure the caller should surface distinctly:
    /// it almost always means another process holds the database file.
    pub fn is_fatal_store_lock(&self) -> bool {
        matches!(self, Self::Storage(StorageError::RecreateFailed(_)))
    }
}

/// Storage-related errors.
///
/// These errors indicate problems with the underlying storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database file or data is corrupted.
    #[error("Database corrupted: {0}")]
    Corrupted(String),

    /// Database is locked by another process or another open handle.
    #[error("Database is locked by another open connection")]
    DatabaseLocked,

    /// Transaction failed (commit, rollback, etc.).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Redb(String),

    /// Database schema version is newer than this build understands.
    #[error("Schema version mismatch: expected at most {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Highest schema version this build can open.
        expected: u32,
        /// Actual schema version found in database.
        found: u32,
    },

    /// Table not found in database.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A failed wipe could not be recovered by recreating the store.
    #[error(
        "Could not recreate the journal store ({0}). \
         Close other open instances of this app and retry"
    )]
    RecreateFailed(String),
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a transaction error with the given message.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a redb error with the given message.
    pub fn redb(msg: impl Into<String>) -> Self {
        Self::Redb(msg.into())
    }
}

// Conversions from redb error types
impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        match err {
            redb::DatabaseError::DatabaseAlreadyOpen => StorageError::DatabaseLocked,
            other => StorageError::Redb(other.to_string()),
        }
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        match err {
            redb::TableError::TableDoesNotExist(name) => StorageError::TableNotFound(name),
            other => StorageError::Redb(format!("Table error: {}", other)),
        }
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Redb(format!("Storage error: {}", err))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// Also allow direct conversion to ReflectDBError for convenience
impl From<redb::Error> for ReflectDBError {
    fn from(err: redb::Error) -> Self {
        ReflectDBError::Storage(StorageError::from(err))
    }
}

impl From<redb::DatabaseError> for ReflectDBError {
    fn from(err: redb::DatabaseError) -> Self {
        ReflectDBError::Storage(StorageError::from(err))
    }
}

impl From<redb::TransactionError> for ReflectDBError {
    fn from(err: redb::TransactionError) -> Self {
        ReflectDBError::Storage(StorageError::from(err))
    }
}

impl From<redb::CommitError> for ReflectDBError {
    fn from(err: redb::CommitError) -> Self {
        ReflectDBError::Storage(StorageError::from(err))
    }
}

impl From<redb::TableError> for ReflectDBError {
    fn from(err: redb::TableError) -> Self {
        ReflectDBError::Storage(StorageError::from(err))
    }
}

impl From<redb::StorageError> for ReflectDBError {
    fn from(err: redb::StorageError) -> Self {
        ReflectDBError::Storage(StorageError::from(err))
    }
}

impl From<bincode::Error> for ReflectDBError {
    fn from(err: bincode::Error) -> Self {
        ReflectDBError::Storage(StorageError::from(err))
    }
}

impl From<serde_json::Error> for ReflectDBError {
    fn from(err: serde_json::Error) -> Self {
        ReflectDBError::Storage(StorageError::from(err))
    }
}

/// Validation errors for input data.
///
/// Only raised for constraints that cannot be repaired locally, such as
/// two records claiming the same calendar day.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },

    /// Another record already owns this calendar date.
    #[error("Date {date} already belongs to record {existing}")]
    DuplicateDate {
        /// The contested `YYYY-MM-DD` date.
        date: String,
        /// Id of the record that owns the date.
        existing: String,
    },

    /// Content exceeds maximum allowed size.
    #[error("Content too large: {size} chars (max: {max} chars)")]
    ContentTooLarge {
        /// Actual content size in chars.
        size: usize,
        /// Maximum allowed size in chars.
        max: usize,
    },
}

impl ValidationError {
    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }

    /// Creates a duplicate date error.
    pub fn duplicate_date(date: impl Into<String>, existing: impl Into<String>) -> Self {
        Self::DuplicateDate {
            date: date.into(),
            existing: existing.into(),
        }
    }

    /// Creates a content too large error.
    pub fn content_too_large(size: usize, max: usize) -> Self {
        Self::ContentTooLarge { size, max }
    }
}

/// Reasons an import payload is rejected outright.
///
/// An import that fails with one of these has not touched the store.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The payload is not a JSON object (or not JSON at all).
    #[error("Malformed import payload: {0}")]
    Malformed(String),

    /// The payload has no `entries` array.
    #[error("Import payload has no entries")]
    MissingEntries,

    /// The advertised data version is outside the supported range.
    #[error("Unsupported data version {found} (supported: 1..={supported})")]
    IncompatibleVersion {
        /// Version found in the payload.
        found: u32,
        /// Newest version this build understands.
        supported: u32,
    },
}

impl ImportError {
    /// Creates a malformed payload error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Not found errors for specific entity types.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// Record with given ID not found.
    #[error("Record not found: {0}")]
    Record(String),

    /// Insight with given ID not found.
    #[error("Insight not found: {0}")]
    Insight(String),
}

impl NotFoundError {
    /// Creates a record not found error.
    pub fn record(id: impl ToString) -> Self {
        Self::Record(id.to_string())
    }

    /// Creates an insight not found error.
    pub fn insight(id: impl ToString) -> Self {
        Self::Insight(id.to_string())
    }
}
