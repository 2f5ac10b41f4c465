//! Catalog management errors.

use lectern_core::ModelError;
use lectern_progress::ErrorKind;
use lectern_storage::StorageError;

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors returned by the catalog manager.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Course, module or lecture absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Module number or lecture order already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Actor may not see the lecture
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Rejected by model validation
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Unexpected storage failure
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl CatalogError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Invalid(_) => ErrorKind::Invalid,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl From<StorageError> for CatalogError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict(msg) => Self::Conflict(msg),
            StorageError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Storage(other),
        }
    }
}

impl From<ModelError> for CatalogError {
    fn from(e: ModelError) -> Self {
        Self::Invalid(e.to_string())
    }
}
