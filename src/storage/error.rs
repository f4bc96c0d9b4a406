//! Storage layer error types
//!
//! Defines all errors that can occur while talking to the relational store.
//! Consistency failures (a missing expected row, a count mismatch, a lost
//! optimistic check) are not errors: repositories report them as `None`/`false`
//! so the caller can abandon the tick without committing.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// The database driver reported a failure (connection, locking, constraint)
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (checksum mismatch, dangling index, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Requested collection, view or page does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before reaching the database
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    /// Whether retrying the same work later may succeed
    ///
    /// Busy/locked databases and I/O hiccups are transient; bad input and
    /// corrupt rows are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::SystemIoFailure
            ),
            StorageError::Io(_) => true,
            _ => false,
        }
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

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
