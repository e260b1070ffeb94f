//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Restoring progress from a checkpoint and seeding the record store
//! - Walking prefectures and their lines in hierarchy order
//! - Fetching lines (optionally several at once) under the retry policy
//! - Asking the source for station page details of new candidates
//! - Routing candidates through the record store and counting outcomes
//! - Periodic checkpointing, interruption and final cleanup
//!
//! The coordinator is the only owner of [`CrawlProgress`] and the only writer of both the
//! stations CSV and the checkpoint file.

use crate::config::Config;
use crate::crawler::retry::{retry_with_backoff, RetryOutcome, RetryPolicy};
use crate::crawler::source::{CatalogSource, FetchError, Prefecture, RailLine};
use crate::output::ProgressReport;
use crate::state::{AddOutcome, CrawlCounters, CrawlProgress, CrawlStatus};
use crate::station::Station;
use crate::storage::{Checkpoint, CheckpointStore, DuplicatePolicy, RecordStore, StorageResult};
use crate::AtlasError;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Knobs for a crawl run
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Continue from the last checkpoint instead of starting fresh
    pub resume: bool,

    /// Accepted records between checkpoints
    pub checkpoint_interval: u64,

    /// Upper bound on a single fetch attempt
    pub request_timeout: Duration,

    pub retry: RetryPolicy,

    /// Pause between consecutive request batches
    pub request_delay: Duration,

    /// Lines fetched concurrently within a prefecture
    pub max_concurrent_fetches: usize,

    /// Only the first N lines of each prefecture are crawled
    pub max_lines_per_prefecture: Option<usize>,

    /// Hash of the configuration, stored in every checkpoint
    pub config_hash: Option<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            resume: false,
            checkpoint_interval: 50,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            request_delay: Duration::from_secs(1),
            max_concurrent_fetches: 1,
            max_lines_per_prefecture: None,
            config_hash: None,
        }
    }
}

impl CrawlOptions {
    /// Builds options from the `[crawler]` section of a configuration
    pub fn from_config(config: &Config, config_hash: Option<String>) -> Self {
        let crawler = &config.crawler;
        Self {
            resume: false,
            checkpoint_interval: crawler.checkpoint_interval,
            request_timeout: Duration::from_secs(crawler.request_timeout_secs),
            retry: RetryPolicy {
                max_retries: crawler.max_retries,
                base_delay: Duration::from_millis(crawler.retry_base_delay_ms),
                max_delay: Duration::from_millis(crawler.retry_max_delay_ms),
            },
            request_delay: Duration::from_millis(crawler.request_delay_ms),
            max_concurrent_fetches: crawler.max_concurrent_fetches,
            max_lines_per_prefecture: crawler.max_lines_per_prefecture,
            config_hash,
        }
    }
}

/// A hierarchy node that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub prefecture: String,

    /// `None` when the prefecture's line listing itself failed
    pub line: Option<String>,

    pub message: String,
}

/// Outcome of a crawl run
///
/// Counters cover this run only; cumulative counters live in the checkpoint.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub status: CrawlStatus,
    pub stations_found: u64,
    pub duplicates_filtered: u64,
    pub errors: u64,
    pub rejected: u64,
    pub lines_completed: u64,
    pub elapsed: Duration,
    pub failed_nodes: Vec<NodeFailure>,

    /// Cause of a `failed` run
    pub failure: Option<String>,
}

/// How the hierarchy walk ended
enum Termination {
    Exhausted,
    Cancelled,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    options: CrawlOptions,
    source: Arc<dyn CatalogSource>,
    records: RecordStore,
    checkpoints: Box<dyn CheckpointStore>,
    progress: CrawlProgress,
    cancel: CancellationToken,
    reporter: watch::Sender<ProgressReport>,
    run_counters: CrawlCounters,
    lines_this_run: u64,
    failed_nodes: Vec<NodeFailure>,
    accepted_since_checkpoint: u64,
    prefectures_total: usize,
    started: Instant,
    requests_issued: bool,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `options` - Crawl options
    /// * `source` - The fetch collaborator
    /// * `records` - Record store; callers may pre-seed it with `load_existing`
    /// * `checkpoints` - Where progress snapshots are persisted
    pub fn new(
        options: CrawlOptions,
        source: Arc<dyn CatalogSource>,
        records: RecordStore,
        checkpoints: Box<dyn CheckpointStore>,
    ) -> Self {
        let (reporter, _) = watch::channel(ProgressReport::idle(0));
        Self {
            options,
            source,
            records,
            checkpoints,
            progress: CrawlProgress::new(Utc::now()),
            cancel: CancellationToken::new(),
            reporter,
            run_counters: CrawlCounters::default(),
            lines_this_run: 0,
            failed_nodes: Vec::new(),
            accepted_since_checkpoint: 0,
            prefectures_total: 0,
            started: Instant::now(),
            requests_issued: false,
        }
    }

    /// Uses an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that interrupts the crawl at the next safe point when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribes to live progress reports
    pub fn subscribe(&self) -> watch::Receiver<ProgressReport> {
        self.reporter.subscribe()
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn into_records(self) -> RecordStore {
        self.records
    }

    pub fn progress(&self) -> &CrawlProgress {
        &self.progress
    }

    /// Runs the crawl over `hierarchy`
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlResult)` - The run ended; `status` tells how
    /// * `Err(AtlasError)` - The run could not start (unreadable CSV or corrupt checkpoint)
    pub async fn run(&mut self, hierarchy: &[Prefecture]) -> Result<CrawlResult, AtlasError> {
        self.started = Instant::now();
        self.prefectures_total = hierarchy.len();
        self.prepare()?;

        tracing::info!(
            "Starting crawl of {} prefectures ({} stations known, {} lines already complete)",
            hierarchy.len(),
            self.records.len(),
            self.progress.lines_completed()
        );
        self.publish(CrawlStatus::Running);

        let (status, failure) = match self.crawl_hierarchy(hierarchy).await {
            Ok(Termination::Exhausted) => match self.finish() {
                Ok(()) => (CrawlStatus::Completed, None),
                Err(e) => (CrawlStatus::Failed, Some(e)),
            },
            Ok(Termination::Cancelled) => match self.checkpoint() {
                Ok(()) => {
                    tracing::info!(
                        "Crawl interrupted; progress saved to {}",
                        self.checkpoints.location()
                    );
                    (CrawlStatus::Interrupted, None)
                }
                Err(e) => (CrawlStatus::Failed, Some(e)),
            },
            Err(e) => (CrawlStatus::Failed, Some(e)),
        };

        if let Some(e) = &failure {
            tracing::error!("Crawl aborted: {}", e);
        }
        self.publish(status);

        let result = CrawlResult {
            status,
            stations_found: self.run_counters.stations_found,
            duplicates_filtered: self.run_counters.duplicates_filtered,
            errors: self.run_counters.errors,
            rejected: self.run_counters.rejected,
            lines_completed: self.lines_this_run,
            elapsed: self.started.elapsed(),
            failed_nodes: self.failed_nodes.clone(),
            failure: failure.map(|e| e.to_string()),
        };

        tracing::info!(
            "Crawl {}: {} new stations, {} duplicates, {} errors in {:?}",
            result.status,
            result.stations_found,
            result.duplicates_filtered,
            result.errors,
            result.elapsed
        );
        Ok(result)
    }

    /// Restores progress and seeds the record store when resuming
    fn prepare(&mut self) -> Result<(), AtlasError> {
        if !self.options.resume {
            return Ok(());
        }

        self.records.load_existing()?;

        match self.checkpoints.load()? {
            Some(checkpoint) => {
                if let (Some(saved), Some(current)) =
                    (&checkpoint.config_hash, &self.options.config_hash)
                {
                    if saved != current {
                        tracing::warn!(
                            "Configuration changed since the checkpoint was written; resuming anyway"
                        );
                    }
                }
                tracing::info!(
                    "Resuming from checkpoint saved at {} ({} prefectures, {} lines complete)",
                    checkpoint.saved_at,
                    checkpoint.progress.prefectures_completed(),
                    checkpoint.progress.lines_completed()
                );
                self.progress = checkpoint.progress;
            }
            None => {
                tracing::info!(
                    "No checkpoint at {}, starting from the beginning",
                    self.checkpoints.location()
                );
            }
        }
        Ok(())
    }

    async fn crawl_hierarchy(&mut self, hierarchy: &[Prefecture]) -> StorageResult<Termination> {
        for prefecture in hierarchy {
            if self.cancel.is_cancelled() {
                return Ok(Termination::Cancelled);
            }
            if self.progress.is_prefecture_complete(&prefecture.id) {
                tracing::debug!("Skipping completed prefecture {}", prefecture);
                continue;
            }

            self.progress
                .set_position(&prefecture.id, &prefecture.name, None);
            self.publish(CrawlStatus::Running);

            if !self.pace().await {
                return Ok(Termination::Cancelled);
            }
            let lines = match self.list_lines(prefecture).await {
                RetryOutcome::Success(lines) => lines,
                RetryOutcome::Exhausted { error, attempts } => {
                    self.record_failure(prefecture, None, &error, attempts);
                    continue;
                }
                RetryOutcome::Cancelled => return Ok(Termination::Cancelled),
            };

            if let Termination::Cancelled = self.crawl_prefecture(prefecture, lines).await? {
                return Ok(Termination::Cancelled);
            }
        }

        self.progress.clear_position();
        Ok(Termination::Exhausted)
    }

    async fn crawl_prefecture(
        &mut self,
        prefecture: &Prefecture,
        mut lines: Vec<RailLine>,
    ) -> StorageResult<Termination> {
        if let Some(limit) = self.options.max_lines_per_prefecture {
            lines.truncate(limit);
        }
        let pending: Vec<RailLine> = lines
            .into_iter()
            .filter(|line| {
                let done = self.progress.is_line_complete(&prefecture.id, &line.name);
                if done {
                    tracing::debug!("Skipping completed line {} in {}", line.name, prefecture.name);
                }
                !done
            })
            .collect();

        tracing::info!("Crawling {} lines in {}", pending.len(), prefecture);

        let mut all_lines_ok = true;
        let batch_size = self.options.max_concurrent_fetches.max(1);

        for batch in pending.chunks(batch_size) {
            if self.cancel.is_cancelled() || !self.pace().await {
                return Ok(Termination::Cancelled);
            }

            self.progress.set_position(
                &prefecture.id,
                &prefecture.name,
                Some(&batch[0].name),
            );
            self.publish(CrawlStatus::Running);

            let source = Arc::clone(&self.source);
            let retry = self.options.retry;
            let timeout = self.options.request_timeout;
            let cancel = self.cancel.clone();
            let outcomes = join_all(batch.iter().map(|line| {
                let source = source.as_ref();
                let cancel = &cancel;
                async move {
                    retry_with_backoff(&retry, timeout, cancel, || {
                        source.fetch_stations(prefecture, line, timeout)
                    })
                    .await
                }
            }))
            .await;

            let mut cancelled = false;
            for (line, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    RetryOutcome::Success(stations) => {
                        let stations = self.enrich_new(prefecture, stations).await;
                        self.record_line(prefecture, line, stations);
                    }
                    RetryOutcome::Exhausted { error, attempts } => {
                        all_lines_ok = false;
                        self.record_failure(prefecture, Some(line), &error, attempts);
                    }
                    RetryOutcome::Cancelled => {
                        all_lines_ok = false;
                        cancelled = true;
                    }
                }
                self.maybe_checkpoint()?;
            }

            if cancelled {
                return Ok(Termination::Cancelled);
            }
        }

        if all_lines_ok {
            self.progress.complete_prefecture(&prefecture.id);
            tracing::info!("Completed {}", prefecture);
        } else {
            tracing::warn!(
                "{} left incomplete; failed lines will be retried on resume",
                prefecture
            );
        }
        Ok(Termination::Exhausted)
    }

    async fn list_lines(&self, prefecture: &Prefecture) -> RetryOutcome<Vec<RailLine>> {
        let source = Arc::clone(&self.source);
        let timeout = self.options.request_timeout;
        retry_with_backoff(&self.options.retry, timeout, &self.cancel, || {
            source.list_lines(prefecture, timeout)
        })
        .await
    }

    /// Waits out the politeness delay before a request; returns false if cancelled meanwhile
    async fn pace(&mut self) -> bool {
        if !std::mem::replace(&mut self.requests_issued, true)
            || self.options.request_delay.is_zero()
        {
            return true;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.options.request_delay) => true,
        }
    }

    /// Lets the source add station page details to the candidates the store would take
    ///
    /// Candidates the store already holds under first-write-wins pass through untouched, and
    /// so does everything once the crawl is cancelled.
    async fn enrich_new(&self, prefecture: &Prefecture, stations: Vec<Station>) -> Vec<Station> {
        let timeout = self.options.request_timeout;
        let mut seen = HashSet::new();
        let mut enriched = Vec::with_capacity(stations.len());

        for mut station in stations {
            if station.prefecture.is_none() {
                station.prefecture = Some(prefecture.name.clone());
            }
            let wanted = station.has_name()
                && seen.insert(station.key())
                && (self.records.policy() == DuplicatePolicy::LastWriteWins
                    || !self.records.contains(&station.name, station.prefecture.as_deref()));
            if !wanted || self.cancel.is_cancelled() {
                enriched.push(station);
                continue;
            }

            let fallback = station.clone();
            let station = tokio::select! {
                _ = self.cancel.cancelled() => fallback,
                station = self.source.enrich_station(station, timeout) => station,
            };
            enriched.push(station);
        }
        enriched
    }

    fn record_line(&mut self, prefecture: &Prefecture, line: &RailLine, stations: Vec<Station>) {
        let mut accepted = 0;
        for mut station in stations {
            if station.prefecture.is_none() {
                station.prefecture = Some(prefecture.name.clone());
            }

            let outcome = self.records.add_if_new(station);
            match outcome {
                AddOutcome::Accepted => accepted += 1,
                AddOutcome::Rejected => {
                    tracing::warn!("Rejected candidate without a name on {}", line.name)
                }
                AddOutcome::Duplicate | AddOutcome::Replaced => {}
            }
            self.progress.counters.tally(outcome);
            self.run_counters.tally(outcome);
        }

        self.accepted_since_checkpoint += accepted;
        self.progress.complete_line(&prefecture.id, &line.name);
        self.lines_this_run += 1;

        tracing::debug!("{} / {}: {} new stations", prefecture.name, line.name, accepted);
        self.publish(CrawlStatus::Running);
    }

    fn record_failure(
        &mut self,
        prefecture: &Prefecture,
        line: Option<&RailLine>,
        error: &FetchError,
        attempts: u32,
    ) {
        match line {
            Some(line) => tracing::warn!(
                "Giving up on {} / {} after {} attempts: {}",
                prefecture.name,
                line.name,
                attempts,
                error
            ),
            None => tracing::warn!(
                "Giving up on line listing for {} after {} attempts: {}",
                prefecture,
                attempts,
                error
            ),
        }

        self.progress.counters.errors += 1;
        self.run_counters.errors += 1;
        self.failed_nodes.push(NodeFailure {
            prefecture: prefecture.id.clone(),
            line: line.map(|l| l.name.clone()),
            message: error.to_string(),
        });
        self.publish(CrawlStatus::Running);
    }

    fn maybe_checkpoint(&mut self) -> StorageResult<()> {
        if self.accepted_since_checkpoint >= self.options.checkpoint_interval.max(1) {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Flushes pending records, then persists a progress snapshot
    ///
    /// Rows go to disk before the checkpoint that accounts for them, so a checkpoint never claims
    /// a line whose stations are missing from the CSV.
    fn checkpoint(&mut self) -> StorageResult<()> {
        let flushed = self.records.flush()?;

        let now = Utc::now();
        self.progress.last_checkpoint_at = Some(now);
        let snapshot =
            Checkpoint::capture(&self.progress, self.options.config_hash.as_deref(), now);
        self.checkpoints.save(&snapshot)?;
        self.accepted_since_checkpoint = 0;

        tracing::info!(
            "Checkpoint: {} new rows flushed, {} lines complete, {} stations total",
            flushed,
            self.progress.lines_completed(),
            self.records.len()
        );
        Ok(())
    }

    /// Final checkpoint, then best-effort removal of the checkpoint file
    fn finish(&mut self) -> StorageResult<()> {
        self.checkpoint()?;
        if let Err(e) = self.checkpoints.clear() {
            tracing::warn!(
                "Crawl completed but the checkpoint at {} could not be removed: {}",
                self.checkpoints.location(),
                e
            );
        }
        Ok(())
    }

    fn publish(&self, status: CrawlStatus) {
        self.reporter.send_replace(ProgressReport::capture(
            &self.progress,
            self.prefectures_total,
            self.started.elapsed(),
            status,
        ));
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("options", &self.options)
            .field("records", &self.records.len())
            .field("checkpoints", &self.checkpoints.location())
            .finish_non_exhaustive()
    }
}
