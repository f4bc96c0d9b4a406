//! Errors crossing the worker boundary

use crate::fragmentation::FragmentationError;
use crate::storage::StorageError;
use thiserror::Error;

/// Why a worker tick failed
///
/// Consistency failures are not errors; a tick reports them as
/// [`TickOutcome::Aborted`](crate::worker::TickOutcome::Aborted).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A view's definition cannot be used; the view keeps failing its turn until fixed
    #[error("View '{view}': {source}")]
    Definition {
        view: String,
        #[source]
        source: FragmentationError,
    },

    #[error("Worker task failed: {0}")]
    Task(String),
}

impl EngineError {
    /// Whether the same work may succeed when retried later
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Storage(e) => e.is_transient(),
            EngineError::Definition { .. } => false,
            EngineError::Task(_) => false,
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Task(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
