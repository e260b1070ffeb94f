//! Live progress reporting
//!
//! A [`ProgressReport`] is a read-only view computed from the coordinator's progress state. It
//! has no side effects; the coordinator publishes a fresh one after every hierarchy step and
//! callers decide how (and how often) to display it.

use crate::state::{CrawlProgress, CrawlStatus};
use std::fmt;
use std::time::Duration;

/// Snapshot of crawl progress for display
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub status: CrawlStatus,
    pub prefectures_completed: usize,
    pub prefectures_total: usize,
    pub current_prefecture: Option<String>,
    pub current_line: Option<String>,
    pub stations_found: u64,
    pub duplicates_filtered: u64,
    pub lines_completed: usize,
    pub errors: u64,

    /// Time spent in the current run
    pub elapsed: Duration,
}

impl ProgressReport {
    /// Builds a report from progress state
    ///
    /// # Arguments
    ///
    /// * `progress` - The coordinator's progress state
    /// * `prefectures_total` - Size of the hierarchy being crawled
    /// * `elapsed` - Time spent in the current run
    /// * `status` - Current run status
    pub fn capture(
        progress: &CrawlProgress,
        prefectures_total: usize,
        elapsed: Duration,
        status: CrawlStatus,
    ) -> Self {
        Self {
            status,
            prefectures_completed: progress.prefectures_completed(),
            prefectures_total,
            current_prefecture: progress.position.prefecture_name.clone(),
            current_line: progress.position.line.clone(),
            stations_found: progress.counters.stations_found,
            duplicates_filtered: progress.counters.duplicates_filtered,
            lines_completed: progress.lines_completed(),
            errors: progress.counters.errors,
            elapsed,
        }
    }

    /// Report for a crawl that has not started yet
    pub fn idle(prefectures_total: usize) -> Self {
        Self {
            status: CrawlStatus::Running,
            prefectures_completed: 0,
            prefectures_total,
            current_prefecture: None,
            current_line: None,
            stations_found: 0,
            duplicates_filtered: 0,
            lines_completed: 0,
            errors: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Stations per minute, when there is enough data to compute it
    pub fn rate_per_minute(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 && self.stations_found > 0 {
            Some(self.stations_found as f64 / secs * 60.0)
        } else {
            None
        }
    }
}

impl fmt::Display for ProgressReport {
    /// `[done/total] <prefecture> | Line: <line> | Stations: n | Duplicates: n | Lines: n |
    /// Time: mm:ss | Rate: x/min | Errors: n`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:2}/{}] {}",
            self.prefectures_completed,
            self.prefectures_total,
            self.current_prefecture.as_deref().unwrap_or("Prefectures")
        )?;
        if let Some(line) = &self.current_line {
            write!(f, " | Line: {}", line)?;
        }

        let secs = self.elapsed.as_secs();
        write!(
            f,
            " | Stations: {} | Duplicates: {} | Lines: {} | Time: {:02}:{:02}",
            self.stations_found,
            self.duplicates_filtered,
            self.lines_completed,
            secs / 60,
            secs % 60
        )?;
        if let Some(rate) = self.rate_per_minute() {
            write!(f, " | Rate: {:.1}/min", rate)?;
        }
        write!(f, " | Errors: {}", self.errors)
    }
}
