//! Fragmentation error types

use thiserror::Error;

/// Errors in a view's fragmentation definition
///
/// All of these surface when the definition is parsed, before any member is
/// processed, and are never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FragmentationError {
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("{unit} period of {value} is out of range [{min}, {max}]")]
    PeriodOutOfRange {
        unit: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Unknown fragmentation strategy '{0}'")]
    UnknownStrategy(String),

    #[error("Only one fragmentation strategy is supported, got {0}")]
    MultipleStrategies(usize),

    #[error("Invalid view definition: {0}")]
    InvalidDefinition(String),
}

impl From<serde_json::Error> for FragmentationError {
    fn from(err: serde_json::Error) -> Self {
        FragmentationError::InvalidDefinition(err.to_string())
    }
}

/// A member whose timestamp path does not resolve to a usable value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Invalid timestamp literal '{0}'")]
    InvalidTimestamp(String),

    #[error("Timestamp {0} has no bucket within the supported date range")]
    OutOfRange(String),
}

pub type FragmentationResult<T> = Result<T, FragmentationError>;
