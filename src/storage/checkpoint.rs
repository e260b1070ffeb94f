//! JSON checkpoint storage
//!
//! A checkpoint is written to `<path>.tmp`, synced, then renamed over `<path>`. A crash at any
//! point leaves either the previous checkpoint or the new one, never a torn file.

use crate::state::CrawlProgress;
use crate::storage::csv_file::{ensure_parent, tmp_path};
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Current checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// A serialized snapshot of crawl progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub saved_at: DateTime<Utc>,

    /// Hash of the configuration the crawl was started with
    #[serde(default)]
    pub config_hash: Option<String>,

    pub progress: CrawlProgress,
}

impl Checkpoint {
    /// Takes a snapshot of `progress`
    pub fn capture(progress: &CrawlProgress, config_hash: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            saved_at: now,
            config_hash: config_hash.map(str::to_string),
            progress: progress.clone(),
        }
    }
}

/// Checkpoint store backed by a single JSON file
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl Into<String>) -> StorageError {
        StorageError::CorruptCheckpoint {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        ensure_parent(&self.path)?;
        let bytes = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tmp = tmp_path(&self.path);
        let mut file = File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
        file.write_all(&bytes)
            .map_err(|e| StorageError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StorageError::io(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| StorageError::io(&self.path, e))?;

        tracing::debug!("Checkpoint written to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> StorageResult<Option<Checkpoint>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        let checkpoint: Checkpoint =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;

        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(self.corrupt(format!(
                "unsupported version {} (expected {})",
                checkpoint.version, CHECKPOINT_VERSION
            )));
        }

        if checkpoint
            .progress
            .completed_lines
            .iter()
            .any(|key| key.prefecture.is_empty() || key.line.is_empty())
        {
            return Err(self.corrupt("completed line with empty identifier"));
        }

        Ok(Some(checkpoint))
    }

    fn clear(&mut self) -> StorageResult<()> {
        for path in [self.path.clone(), tmp_path(&self.path)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
