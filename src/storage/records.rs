//! In-memory station set with CSV-backed persistence
//!
//! The store keeps every known station in insertion order, plus an index from the normalized
//! dedup key to its position. Newly accepted stations are held in a pending buffer until the
//! coordinator calls [`RecordStore::flush`], which appends them to the CSV file.

use crate::state::AddOutcome;
use crate::station::{Station, StationKey};
use crate::storage::csv_file::{write_atomic, StationCsv};
use crate::storage::traits::StorageResult;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// How a candidate whose key is already stored is handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Keep the stored record untouched
    #[default]
    FirstWriteWins,

    /// Overwrite the stored record in place, keeping its position
    LastWriteWins,
}

/// Deduplicating set of station records
#[derive(Debug)]
pub struct RecordStore {
    stations: Vec<Station>,
    index: HashMap<StationKey, usize>,
    pending: Vec<Station>,
    policy: DuplicatePolicy,
    file: Option<StationCsv>,
    loaded: bool,
}

impl RecordStore {
    /// Creates a store with no persistence
    pub fn in_memory(policy: DuplicatePolicy) -> Self {
        Self {
            stations: Vec::new(),
            index: HashMap::new(),
            pending: Vec::new(),
            policy,
            file: None,
            loaded: false,
        }
    }

    /// Creates a store persisted to the CSV file at `path`
    ///
    /// Nothing is read until [`load_existing`](Self::load_existing) is called.
    pub fn with_csv(path: impl AsRef<Path>, policy: DuplicatePolicy) -> Self {
        Self {
            file: Some(StationCsv::new(path.as_ref())),
            ..Self::in_memory(policy)
        }
    }

    /// Seeds the key set from the CSV file
    ///
    /// Loaded rows are already durable, so they never enter the pending buffer. Calling this more
    /// than once is a no-op.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of distinct stations now in the store
    /// * `Err(StorageError)` - The file exists but could not be read
    pub fn load_existing(&mut self) -> StorageResult<usize> {
        if self.loaded {
            return Ok(self.stations.len());
        }
        let Some(file) = self.file.clone() else {
            self.loaded = true;
            return Ok(self.stations.len());
        };

        let rows = file.read_all()?;
        let row_count = rows.len();
        for station in rows {
            self.insert(station);
        }
        self.loaded = true;

        tracing::info!(
            "Loaded {} stations ({} rows) from {}",
            self.stations.len(),
            row_count,
            file.path().display()
        );
        Ok(self.stations.len())
    }

    /// Offers a candidate to the store
    ///
    /// An accepted (or, under last-write-wins, replacing) record is queued for the next flush.
    pub fn add_if_new(&mut self, station: Station) -> AddOutcome {
        if !station.has_name() {
            return AddOutcome::Rejected;
        }
        let outcome = self.insert(station.clone());
        if matches!(outcome, AddOutcome::Accepted | AddOutcome::Replaced) {
            self.pending.push(station);
        }
        outcome
    }

    fn insert(&mut self, station: Station) -> AddOutcome {
        let key = station.key();
        match self.index.get(&key) {
            Some(&position) => match self.policy {
                DuplicatePolicy::FirstWriteWins => AddOutcome::Duplicate,
                DuplicatePolicy::LastWriteWins => {
                    self.stations[position] = station;
                    AddOutcome::Replaced
                }
            },
            None => {
                self.index.insert(key, self.stations.len());
                self.stations.push(station);
                AddOutcome::Accepted
            }
        }
    }

    pub fn contains(&self, name: &str, prefecture: Option<&str>) -> bool {
        self.index.contains_key(&StationKey::new(name, prefecture))
    }

    pub fn get(&self, name: &str, prefecture: Option<&str>) -> Option<&Station> {
        self.index
            .get(&StationKey::new(name, prefecture))
            .map(|&position| &self.stations[position])
    }

    /// All stations in insertion order
    pub fn all(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Number of accepted stations not yet written to disk
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(StationCsv::path)
    }

    /// Appends pending stations to the CSV file
    ///
    /// The pending buffer is only cleared once the append succeeded, so a failed flush can be
    /// retried without losing records. Without a backing file the buffer is simply dropped.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of rows written
    /// * `Err(StorageError)` - The append failed
    pub fn flush(&mut self) -> StorageResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let written = self.pending.len();
        if let Some(file) = &self.file {
            file.append(&self.pending)?;
            tracing::debug!("Flushed {} stations to {}", written, file.path().display());
        }
        self.pending.clear();
        Ok(written)
    }

    /// Writes the deduplicated store to `path`, replacing its content atomically
    pub fn export(&self, path: &Path) -> StorageResult<usize> {
        write_atomic(path, &self.stations)?;
        Ok(self.stations.len())
    }
}
