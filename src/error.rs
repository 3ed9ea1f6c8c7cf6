use thiserror::Error;

use crate::config::ConfigError;
use crate::query::SchemaError;
use crate::storage::StoreError;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised while loading, sweeping or recording a sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The schema or relationship selection is invalid.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A run-scoped parameter required by the statement was not supplied.
    /// Raised before anything is sent to the store.
    #[error("run parameter '{name}' required by '{label}' was not supplied")]
    MissingRunParameter {
        /// Entity label whose statement needs the parameter.
        label: String,
        /// Parameter name.
        name: String,
    },
    /// An upsert batch failed; earlier batches stay committed.
    #[error("{label}: batch {batch_index} failed after {committed} committed batches: {source}")]
    PartialBatch {
        /// Entity label being loaded.
        label: String,
        /// Zero-based index of the failed batch.
        batch_index: usize,
        /// Number of batches committed before the failure.
        committed: usize,
        /// Store error.
        source: StoreError,
    },
    /// An index, cleanup or metadata statement failed.
    #[error("{label}: {source}")]
    Store {
        /// Entity label the statement worked on.
        label: String,
        /// Store error.
        source: StoreError,
    },
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// Machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Schema(err) => err.code(),
            SyncError::MissingRunParameter { .. } => "MissingRunParameter",
            SyncError::PartialBatch { .. } => "PartialBatch",
            SyncError::Store { .. } => "Store",
            SyncError::Config(_) => "Config",
        }
    }

    /// Store error behind this failure, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            SyncError::PartialBatch { source, .. } | SyncError::Store { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Whether re-running the failed call may succeed.
    pub fn is_transient(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_transient)
    }
}
