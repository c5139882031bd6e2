//! Error types for diffy stores
//!
//! Store failures never abort analysis on their own:
//! - configuration lookups fall back to the last known good snapshot
//! - a failed save hands the computed result back to the caller

use diffy_model::DifferenceResult;
use std::path::PathBuf;

/// Store operation failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backing store cannot be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// File I/O failed
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A different record already exists under the same id
    #[error("conflicting record for id {0}")]
    Conflict(String),
}

impl StoreError {
    /// Create unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create I/O error for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if retrying the operation may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io { .. })
    }
}

/// Analysis service failure
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Analysis succeeded but the result was not stored
    #[error("result {} not persisted: {source}", .result.id())]
    Persistence {
        /// The computed result
        result: Box<DifferenceResult>,
        /// Store failure
        #[source]
        source: StoreError,
    },
    /// The blocking analysis task did not complete
    #[error("analysis task aborted: {0}")]
    Aborted(String),
}

impl ServiceError {
    /// Result carried by the error, if analysis completed
    #[must_use]
    pub fn result(&self) -> Option<&DifferenceResult> {
        match self {
            Self::Persistence { result, .. } => Some(result),
            Self::Aborted(_) => None,
        }
    }

    /// Recover the computed result
    #[must_use]
    pub fn into_result(self) -> Option<DifferenceResult> {
        match self {
            Self::Persistence { result, .. } => Some(*result),
            Self::Aborted(_) => None,
        }
    }
}
