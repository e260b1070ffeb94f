//! Crawler module for walking the station catalog
//!
//! This module contains the core crawling logic, including:
//! - The catalog source abstraction and its HTTP implementation
//! - HTML parsing of prefecture and line pages
//! - Retry with exponential backoff
//! - Overall crawl coordination and checkpointing

mod coordinator;
mod fetcher;
mod parser;
mod retry;
mod source;

pub use coordinator::{Coordinator, CrawlOptions, CrawlResult, NodeFailure};
pub use fetcher::{build_http_client, HttpCatalogSource};
pub use parser::{
    company_code, company_from_line, extract_line_links, extract_station_details,
    extract_station_links, line_type_from_line, CatalogLink, StationDetails, StationLink,
};
pub use retry::{retry_with_backoff, RetryOutcome, RetryPolicy};
pub use source::{CatalogSource, FetchError, FetchErrorKind, Prefecture, RailLine, StaticCatalog};

use crate::config::Config;
use crate::storage::{FileCheckpointStore, RecordStore};
use crate::AtlasError;
use std::sync::Arc;
use std::time::Duration;

/// Builds a coordinator that crawls the transit site described by `config`
///
/// The record store is seeded from the stations CSV before returning, whether or not the crawl
/// resumes, so the append-only file never receives a row it already holds.
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `options` - Crawl options (usually [`CrawlOptions::from_config`] plus CLI overrides)
///
/// # Returns
///
/// * `Ok(Coordinator)` - Ready to run
/// * `Err(AtlasError)` - HTTP client, base URL or stations file could not be set up
pub fn build_coordinator(config: &Config, options: CrawlOptions) -> Result<Coordinator, AtlasError> {
    let client = build_http_client(&config.user_agent)?;
    let mut source = HttpCatalogSource::new(client, config.source.base_url()?);
    if config.source.station_details {
        source = source.with_station_details(Duration::from_millis(config.source.detail_delay_ms));
    }

    let mut records = RecordStore::with_csv(
        &config.output.stations_path,
        config.crawler.duplicate_policy,
    );
    records.load_existing()?;

    let checkpoints = FileCheckpointStore::new(&config.output.checkpoint_path);

    Ok(Coordinator::new(
        options,
        Arc::new(source),
        records,
        Box::new(checkpoints),
    ))
}
