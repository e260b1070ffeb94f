//! Storage traits and error types
//!
//! This module defines the checkpoint storage interface and the error type shared by the
//! checkpoint store and the CSV-backed record store.

use crate::storage::Checkpoint;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Every variant is fatal to a crawl: losing persistence guarantees is worse than stopping.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Invalid row {row} in {path}: {message}")]
    InvalidRow {
        path: PathBuf,
        row: u64,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Checkpoint at {path} is corrupt: {reason}")]
    CorruptCheckpoint { path: PathBuf, reason: String },
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Returns true if this error reports an unreadable checkpoint
    pub fn is_corrupt_checkpoint(&self) -> bool {
        matches!(self, Self::CorruptCheckpoint { .. })
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable home for crawl checkpoints
///
/// Implementations must never leave a partially written checkpoint where `load` can see it.
pub trait CheckpointStore: Send {
    /// Persists a checkpoint, replacing any previous one
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Loads the most recent checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Checkpoint))` - A checkpoint exists and is readable
    /// * `Ok(None)` - No checkpoint has been saved
    /// * `Err(StorageError::CorruptCheckpoint)` - A checkpoint exists but cannot be trusted
    fn load(&self) -> StorageResult<Option<Checkpoint>>;

    /// Deletes the checkpoint; deleting a missing checkpoint succeeds
    fn clear(&mut self) -> StorageResult<()>;

    /// Human-readable location, used in log messages
    fn location(&self) -> String;
}
