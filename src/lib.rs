//! Eki-Atlas: a resumable railway station catalog crawler
//!
//! This crate walks a hierarchical station catalog (prefectures → railway lines → stations),
//! deduplicates the records it discovers against earlier runs, checkpoints its progress so an
//! interrupted crawl resumes where it stopped, and serves the accumulated records through a
//! fuzzy-match search index.

pub mod config;
pub mod crawler;
pub mod output;
pub mod search;
pub mod state;
pub mod station;
pub mod storage;

use thiserror::Error;

/// Main error type for Eki-Atlas operations
#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CatalogSource, Coordinator, CrawlOptions, CrawlResult, Prefecture, RailLine};
pub use search::{SearchQuery, StationIndex};
pub use state::{CrawlProgress, CrawlStatus};
pub use station::{Station, StationKey};
pub use storage::{FileCheckpointStore, RecordStore};
