//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlProgress`: completed hierarchy nodes, counters, current position and timestamps
//! - `CrawlStatus`: running / completed / interrupted / failed
//! - `AddOutcome`: how a candidate record was handled by the record store

mod progress;

// Re-export main types
pub use progress::{
    AddOutcome, CrawlCounters, CrawlPosition, CrawlProgress, CrawlStatus, LineKey,
};
