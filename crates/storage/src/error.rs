use crate::record::ProgressId;

/// All errors that can be returned by a ProgressStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No progress row with the given id.
    #[error("progress record not found: {id}")]
    ProgressNotFound { id: ProgressId },

    /// A snapshot tried to write a row belonging to another case.
    #[error("progress record {id} belongs to case {actual}, not {expected}")]
    CaseMismatch {
        id: ProgressId,
        expected: String,
        actual: String,
    },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
