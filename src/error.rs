//! Error types for caskdb.

use std::io;
use thiserror::Error;

/// Result type alias for caskdb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for storage engine operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Empty key is not allowed.
    #[error("Empty key is not allowed")]
    EmptyKey,

    /// The in-memory index rejected an update.
    #[error("Failed to update index")]
    IndexUpdateFailed,

    /// Key not found in the database.
    #[error("Key not found")]
    KeyNotFound,

    /// A position points at a data file that is not open.
    #[error("Data file not found: {0:09}.data")]
    DataFileNotFound(u32),

    /// The data directory contains files the engine cannot interpret.
    #[error("Database directory corrupted: {0}")]
    DirectoryCorrupted(String),

    /// Batch staged more operations than the configured maximum.
    #[error("Batch exceeds max operation count: {count} (max: {max})")]
    ExceedMaxBatchNum { count: usize, max: u32 },

    /// A merge is already running on this engine.
    #[error("Merge is in progress, try again later")]
    MergeInProgress,

    /// The data directory is locked by another engine instance.
    #[error("Database directory is in use by another process")]
    DatabaseInUse,

    /// Reclaimable fraction has not reached the configured merge ratio.
    #[error("Merge ratio not reached: {actual:.3} < {required:.3}")]
    MergeRatioUnreached { actual: f32, required: f32 },

    /// Not enough free disk space to hold the merged file set.
    #[error("Insufficient disk space for merge: need {needed} bytes, {available} available")]
    InsufficientDiskSpace { needed: u64, available: u64 },

    /// CRC checksum mismatch while decoding a log record.
    #[error("Invalid CRC: expected {expected:#010x}, got {actual:#010x}")]
    InvalidCrc { expected: u32, actual: u32 },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The index backend (persistent B+-tree) reported a failure.
    #[error("Index backend error: {0}")]
    IndexBackend(String),

    /// Write batches need the persisted sequence counter, which is missing.
    #[error("Sequence number file not found, write batch is unavailable")]
    BatchSequenceUnavailable,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a directory-corruption error with the given message.
    pub fn corrupted<S: Into<String>>(msg: S) -> Self {
        Error::DirectoryCorrupted(msg.into())
    }

    /// Create an index backend error.
    pub fn index_backend<S: Into<String>>(msg: S) -> Self {
        Error::IndexBackend(msg.into())
    }

    /// Check if this error indicates on-disk corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::DirectoryCorrupted(_) | Error::InvalidCrc { .. }
        )
    }

    /// Check if this error is a caller error that left state unchanged.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::EmptyKey
                | Error::KeyNotFound
                | Error::ExceedMaxBatchNum { .. }
                | Error::MergeRatioUnreached { .. }
        )
    }
}
