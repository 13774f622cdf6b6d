//! Error types for shavar-store.

use std::path::PathBuf;

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The retry schedule changed since it was read.
    ///
    /// Another writer committed a cycle first; this writer's batch was
    /// rolled back.
    #[error("retry schedule was modified concurrently")]
    ScheduleConflict,

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },

    /// A stored row could not be converted back into a record.
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
