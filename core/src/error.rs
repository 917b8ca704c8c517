//! Error types for pipeline construction and execution.

use std::path::PathBuf;

use tally_common::CommonError;
use thiserror::Error;

/// Error type for every fallible operation in tally-core.
#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Record has {len} fields, field {index} requested")]
    FieldIndex { index: usize, len: usize },

    #[error("Malformed record: {reason}")]
    Malformed { reason: String },

    #[error("Cannot convert '{value}' to an integer")]
    Conversion { value: String },

    #[error("Aggregate overflow for key {key}")]
    Overflow { key: String },

    #[error("Invalid pipeline: {0}")]
    InvalidPlan(String),

    #[error("Unsupported streaming operation: {0}")]
    UnsupportedOperation(String),

    #[error("Output path already exists: {}", .0.display())]
    PathExists(PathBuf),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for tally-core operations.
pub type Result<T> = std::result::Result<T, TallyError>;

impl TallyError {
    /// Errors caused by a single bad input record, which the drop policies
    /// are allowed to swallow.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            TallyError::FieldIndex { .. } | TallyError::Malformed { .. } | TallyError::Conversion { .. }
        )
    }
}
