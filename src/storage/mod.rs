//! Storage module for persisting crawl data
//!
//! This module handles everything the crawler writes to disk:
//! - The stations CSV file (append-only during a crawl, atomic rewrite on export)
//! - The deduplicating in-memory record store seeded from that file
//! - Crawl checkpoints (JSON, written through a temporary file and renamed into place)

mod checkpoint;
mod csv_file;
mod records;
mod schema;
mod traits;

pub use checkpoint::{Checkpoint, FileCheckpointStore, CHECKPOINT_VERSION};
pub use csv_file::{write_atomic, StationCsv};
pub use records::{DuplicatePolicy, RecordStore};
pub(crate) use schema::StationRow;
pub use schema::STATION_COLUMNS;
pub use traits::{CheckpointStore, StorageError, StorageResult};
