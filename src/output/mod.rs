//! Output module for progress and result presentation
//!
//! This module handles:
//! - Live crawl progress reports
//! - Station database statistics
//! - Rendering search hits and listings as table, JSON or CSV

mod progress;
mod render;
pub mod stats;

pub use progress::ProgressReport;
pub use render::{render_csv, render_hits, render_stations, render_table, OutputFormat};
pub use stats::{print_statistics, StationStatistics};

use crate::crawler::CrawlResult;

/// Prints the outcome of a crawl run
pub fn print_crawl_result(result: &CrawlResult) {
    println!("=== Crawl {} ===\n", result.status);
    println!("  New stations: {}", result.stations_found);
    println!("  Duplicates filtered: {}", result.duplicates_filtered);
    println!("  Lines completed: {}", result.lines_completed);
    println!("  Errors: {}", result.errors);
    if result.rejected > 0 {
        println!("  Rejected candidates: {}", result.rejected);
    }

    let secs = result.elapsed.as_secs();
    println!("  Elapsed: {:02}:{:02}", secs / 60, secs % 60);

    if !result.failed_nodes.is_empty() {
        println!("\nFailed nodes ({}):", result.failed_nodes.len());
        for node in &result.failed_nodes {
            match &node.line {
                Some(line) => println!("  - {} / {}: {}", node.prefecture, line, node.message),
                None => println!("  - {} (line listing): {}", node.prefecture, node.message),
            }
        }
    }

    if let Some(failure) = &result.failure {
        println!("\nAborted: {}", failure);
    }
}
