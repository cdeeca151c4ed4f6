use std::path::PathBuf;

/// Errors from key-value store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Keys must be non-empty strings.
    #[error("key must not be empty")]
    EmptyKey,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error while reading or writing the snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An existing snapshot file could not be decoded. Fatal at open time:
    /// the store refuses to start empty over a damaged file.
    #[error("corrupt snapshot {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
