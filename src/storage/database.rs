//! Database handle and tick transactions
//!
//! [`Database`] is a cheap, cloneable description of where the store lives.
//! Workers open a fresh connection per tick and run all of that tick's reads and
//! writes inside one [`StoreTx`]. Dropping a `StoreTx` without calling
//! [`StoreTx::commit`] rolls everything back.

use crate::config::StorageConfig;
use crate::storage::error::StorageResult;
use crate::storage::schema::SCHEMA;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Location and connection settings of the relational store
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// Describe a database at `path` without touching the file system
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Build from the `[storage]` configuration section
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.database_path())
            .with_busy_timeout(Duration::from_millis(config.busy_timeout_ms))
    }

    /// Builder method: how long a connection waits on a locked database
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Open the database and create the schema if needed
    pub fn initialize(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = ?self.path, "Database schema ready");
        Ok(())
    }

    /// Open a new connection
    pub fn connect(&self) -> StorageResult<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Ok(conn)
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A write transaction spanning one unit of work
///
/// Repository operations are implemented on this type, grouped per entity in
/// the sibling modules.
pub struct StoreTx<'c> {
    tx: Transaction<'c>,
}

impl<'c> StoreTx<'c> {
    /// Begin an immediate (write-locking) transaction
    pub fn begin(conn: &'c mut Connection) -> StorageResult<Self> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(Self { tx })
    }

    /// Make every change of this unit of work durable
    pub fn commit(self) -> StorageResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    /// Discard every change of this unit of work
    pub fn rollback(self) -> StorageResult<()> {
        self.tx.rollback()?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.tx
    }
}

/// Comma-separated `?` placeholders for an `IN (...)` list
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// Current time as unix milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
