//! Crawl progress tracking
//!
//! [`CrawlProgress`] is the single mutable record of how far a crawl has gotten. The coordinator
//! owns it for the whole run; checkpoints only ever serialize copies of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Terminal (or current) status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    /// Returns true once the run can no longer make progress
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened when a candidate record was offered to the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// New station, stored and queued for the next flush
    Accepted,

    /// Key already known; stored record left untouched
    Duplicate,

    /// Key already known; stored record overwritten (last-write-wins)
    Replaced,

    /// Candidate had no usable name
    Rejected,
}

impl AddOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn is_duplicate(self) -> bool {
        matches!(self, Self::Duplicate | Self::Replaced)
    }
}

/// Record and error counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCounters {
    pub stations_found: u64,
    pub duplicates_filtered: u64,
    pub errors: u64,
    #[serde(default)]
    pub rejected: u64,
}

impl CrawlCounters {
    /// Counts one record store outcome
    pub fn tally(&mut self, outcome: AddOutcome) {
        match outcome {
            AddOutcome::Accepted => self.stations_found += 1,
            AddOutcome::Duplicate | AddOutcome::Replaced => self.duplicates_filtered += 1,
            AddOutcome::Rejected => self.rejected += 1,
        }
    }
}

/// A (prefecture, line) pair, the unit of crawl progress
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub prefecture: String,
    pub line: String,
}

impl LineKey {
    pub fn new(prefecture: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            prefecture: prefecture.into(),
            line: line.into(),
        }
    }
}

/// The hierarchy node currently being processed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlPosition {
    pub prefecture_id: Option<String>,
    pub prefecture_name: Option<String>,
    pub line: Option<String>,
}

/// Progress of a crawl across one or more (resumed) runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlProgress {
    /// Prefecture identifiers whose every line finished
    pub completed_prefectures: BTreeSet<String>,

    /// Finished (prefecture identifier, line name) pairs
    pub completed_lines: BTreeSet<LineKey>,

    /// Cumulative counters, carried across resumes
    pub counters: CrawlCounters,

    pub position: CrawlPosition,

    pub started_at: DateTime<Utc>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
}

impl CrawlProgress {
    /// Creates empty progress for a crawl starting at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            completed_prefectures: BTreeSet::new(),
            completed_lines: BTreeSet::new(),
            counters: CrawlCounters::default(),
            position: CrawlPosition::default(),
            started_at: now,
            last_checkpoint_at: None,
        }
    }

    pub fn is_prefecture_complete(&self, prefecture_id: &str) -> bool {
        self.completed_prefectures.contains(prefecture_id)
    }

    pub fn is_line_complete(&self, prefecture_id: &str, line: &str) -> bool {
        self.completed_lines
            .contains(&LineKey::new(prefecture_id, line))
    }

    /// Marks a line as finished; returns false if it already was
    pub fn complete_line(&mut self, prefecture_id: &str, line: &str) -> bool {
        self.completed_lines.insert(LineKey::new(prefecture_id, line))
    }

    /// Marks a prefecture as finished; returns false if it already was
    pub fn complete_prefecture(&mut self, prefecture_id: &str) -> bool {
        self.completed_prefectures.insert(prefecture_id.to_string())
    }

    pub fn set_position(&mut self, prefecture_id: &str, prefecture_name: &str, line: Option<&str>) {
        self.position = CrawlPosition {
            prefecture_id: Some(prefecture_id.to_string()),
            prefecture_name: Some(prefecture_name.to_string()),
            line: line.map(str::to_string),
        };
    }

    pub fn clear_position(&mut self) {
        self.position = CrawlPosition::default();
    }

    pub fn lines_completed(&self) -> usize {
        self.completed_lines.len()
    }

    pub fn prefectures_completed(&self) -> usize {
        self.completed_prefectures.len()
    }
}
