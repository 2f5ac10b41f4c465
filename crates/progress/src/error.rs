//! Enrollment lifecycle errors.

use lectern_core::{EnrollmentId, ModelError};
use lectern_storage::StorageError;

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Coarse classification of a [`LifecycleError`], for callers mapping to a
/// transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced record absent
    NotFound,
    /// Duplicate or concurrently modified record
    Conflict,
    /// Actor may not perform the operation
    Forbidden,
    /// Request is malformed or inconsistent
    Invalid,
    /// Unexpected persistence failure
    Internal,
}

/// Errors returned by the enrollment lifecycle controller.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Course, lecture or enrollment absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate enrollment or other uniqueness violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another writer saved the enrollment first
    #[error("Enrollment {0} was modified concurrently; retry the operation")]
    Stale(EnrollmentId),

    /// Actor does not own the enrollment and lacks elevated privilege
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Inconsistent request, e.g. a lecture from another course
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Unexpected storage failure
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl LifecycleError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) | Self::Stale(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Invalid(_) => ErrorKind::Invalid,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

impl From<StorageError> for LifecycleError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::VersionConflict { id, .. } => Self::Stale(id),
            StorageError::Conflict(msg) => Self::Conflict(msg),
            StorageError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Storage(other),
        }
    }
}

impl From<ModelError> for LifecycleError {
    fn from(e: ModelError) -> Self {
        Self::Invalid(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_is_retryable_conflict() {
        let err = LifecycleError::from(StorageError::VersionConflict {
            id: EnrollmentId::new(),
            expected: 1,
            found: 2,
        });
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_failure_is_internal() {
        let err = LifecycleError::from(StorageError::Other("disk full".to_string()));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_duplicate_is_not_retryable() {
        let err = LifecycleError::from(StorageError::Conflict("already enrolled".to_string()));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.is_retryable());
    }
}
