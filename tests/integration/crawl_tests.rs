//! Integration tests for the crawl coordinator
//!
//! These tests drive the coordinator against a scripted in-process catalog source and real
//! files in a temporary directory, covering idempotence, interrupt/resume, failure
//! isolation and checkpoint handling.

use async_trait::async_trait;
use eki_atlas::crawler::{
    CatalogSource, Coordinator, CrawlOptions, FetchError, Prefecture, RailLine, RetryPolicy,
};
use eki_atlas::state::CrawlStatus;
use eki_atlas::station::{Station, StationKey};
use eki_atlas::storage::{
    Checkpoint, CheckpointStore, DuplicatePolicy, FileCheckpointStore, RecordStore, StationCsv,
    StorageError, StorageResult,
};
use eki_atlas::AtlasError;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Catalog source whose behavior per line is scripted by the test
#[derive(Default)]
struct ScriptedCatalog {
    lines: HashMap<String, Vec<(String, Vec<Station>)>>,
    failing_lines: HashSet<String>,
    failing_listings: HashSet<String>,
    slow_lines: HashSet<String>,
    flaky_lines: Mutex<HashMap<String, u32>>,
    cancel_after: Option<(usize, CancellationToken)>,
    fetches: Mutex<Vec<String>>,
}

impl ScriptedCatalog {
    fn with_line(mut self, prefecture_id: &str, line: &str, names: &[&str]) -> Self {
        let stations = names.iter().map(|name| Station::new(*name)).collect();
        self.lines
            .entry(prefecture_id.to_string())
            .or_default()
            .push((line.to_string(), stations));
        self
    }

    fn failing_line(mut self, line: &str) -> Self {
        self.failing_lines.insert(line.to_string());
        self
    }

    fn failing_listing(mut self, prefecture_id: &str) -> Self {
        self.failing_listings.insert(prefecture_id.to_string());
        self
    }

    fn slow_line(mut self, line: &str) -> Self {
        self.slow_lines.insert(line.to_string());
        self
    }

    fn flaky_line(self, line: &str, failures: u32) -> Self {
        self.flaky_lines
            .lock()
            .unwrap()
            .insert(line.to_string(), failures);
        self
    }

    /// Cancels `token` once `fetches` line fetches have been issued
    fn cancel_after(mut self, fetches: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((fetches, token));
        self
    }

    fn fetch_count(&self, line: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|fetched| fetched.as_str() == line)
            .count()
    }

    fn unavailable(url: &str) -> FetchError {
        FetchError::Http {
            url: url.to_string(),
            status: Some(503),
            message: "Service Unavailable".to_string(),
        }
    }
}

#[async_trait]
impl CatalogSource for ScriptedCatalog {
    async fn list_lines(
        &self,
        prefecture: &Prefecture,
        _timeout: Duration,
    ) -> Result<Vec<RailLine>, FetchError> {
        if self.failing_listings.contains(&prefecture.id) {
            return Err(Self::unavailable(&prefecture.id));
        }
        Ok(self
            .lines
            .get(&prefecture.id)
            .map(|lines| {
                lines
                    .iter()
                    .map(|(name, _)| RailLine::new(name.clone(), format!("test:{}", name)))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_stations(
        &self,
        prefecture: &Prefecture,
        line: &RailLine,
        _timeout: Duration,
    ) -> Result<Vec<Station>, FetchError> {
        let issued = {
            let mut fetches = self.fetches.lock().unwrap();
            fetches.push(line.name.clone());
            fetches.len()
        };
        if let Some((after, token)) = &self.cancel_after {
            if issued >= *after {
                token.cancel();
            }
        }

        if self.slow_lines.contains(&line.name) {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        if self.failing_lines.contains(&line.name) {
            return Err(Self::unavailable(&line.locator));
        }
        let flaky = {
            let mut flaky_lines = self.flaky_lines.lock().unwrap();
            match flaky_lines.get_mut(&line.name) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if flaky {
            return Err(Self::unavailable(&line.locator));
        }

        Ok(self
            .lines
            .get(&prefecture.id)
            .and_then(|lines| lines.iter().find(|(name, _)| *name == line.name))
            .map(|(_, stations)| stations.clone())
            .unwrap_or_default())
    }
}

/// Checkpoint store that records what was saved and cleared
#[derive(Clone, Default)]
struct RecordingCheckpoints {
    saved_lines: Arc<Mutex<Vec<usize>>>,
    clears: Arc<Mutex<usize>>,
}

impl CheckpointStore for RecordingCheckpoints {
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        self.saved_lines
            .lock()
            .unwrap()
            .push(checkpoint.progress.lines_completed());
        Ok(())
    }

    fn load(&self) -> StorageResult<Option<Checkpoint>> {
        Ok(None)
    }

    fn clear(&mut self) -> StorageResult<()> {
        *self.clears.lock().unwrap() += 1;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Checkpoint store whose writes always fail
struct FailingCheckpoints;

impl CheckpointStore for FailingCheckpoints {
    fn save(&mut self, _checkpoint: &Checkpoint) -> StorageResult<()> {
        Err(StorageError::Io {
            path: PathBuf::from("/full/disk/state.json"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "No space left on device"),
        })
    }

    fn load(&self) -> StorageResult<Option<Checkpoint>> {
        Ok(None)
    }

    fn clear(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn location(&self) -> String {
        "/full/disk/state.json".to_string()
    }
}

/// Options with negligible delays so tests run quickly
fn test_options() -> CrawlOptions {
    CrawlOptions {
        request_timeout: Duration::from_millis(200),
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
        request_delay: Duration::ZERO,
        ..CrawlOptions::default()
    }
}

fn tokyo_osaka() -> Vec<Prefecture> {
    vec![
        Prefecture::new("13", "東京都"),
        Prefecture::new("27", "大阪府"),
    ]
}

fn stations_csv(dir: &TempDir) -> PathBuf {
    dir.path().join("stations.csv")
}

fn checkpoint_path(dir: &TempDir) -> PathBuf {
    dir.path().join("crawl_state.json")
}

fn seeded_store(path: &Path) -> RecordStore {
    let mut records = RecordStore::with_csv(path, DuplicatePolicy::FirstWriteWins);
    records.load_existing().unwrap();
    records
}

fn stored_keys(path: &Path) -> HashSet<StationKey> {
    StationCsv::new(path)
        .read_all()
        .unwrap()
        .iter()
        .map(Station::key)
        .collect()
}

#[tokio::test]
async fn test_fresh_crawl_collects_all_stations() {
    let dir = TempDir::new().unwrap();
    let catalog = ScriptedCatalog::default()
        .with_line("13", "JR山手線", &["新宿"])
        .with_line("27", "御堂筋線", &["梅田"]);

    let mut coordinator = Coordinator::new(
        test_options(),
        Arc::new(catalog),
        seeded_store(&stations_csv(&dir)),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    let result = coordinator.run(&tokyo_osaka()).await.unwrap();

    assert_eq!(result.status, CrawlStatus::Completed);
    assert_eq!(result.stations_found, 2);
    assert_eq!(result.duplicates_filtered, 0);
    assert_eq!(result.errors, 0);

    let stored = StationCsv::new(stations_csv(&dir)).read_all().unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].name, "新宿");
    assert_eq!(stored[0].prefecture.as_deref(), Some("東京都"));
    assert_eq!(stored[1].name, "梅田");
    assert_eq!(stored[1].prefecture.as_deref(), Some("大阪府"));

    // Checkpoint is removed once the crawl completes
    assert!(!checkpoint_path(&dir).exists());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let build = || {
        ScriptedCatalog::default()
            .with_line("13", "JR山手線", &["新宿"])
            .with_line("27", "御堂筋線", &["梅田"])
    };

    let mut first = Coordinator::new(
        test_options(),
        Arc::new(build()),
        seeded_store(&stations_csv(&dir)),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    first.run(&tokyo_osaka()).await.unwrap();

    let mut second = Coordinator::new(
        test_options(),
        Arc::new(build()),
        seeded_store(&stations_csv(&dir)),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    let result = second.run(&tokyo_osaka()).await.unwrap();

    assert_eq!(result.status, CrawlStatus::Completed);
    assert_eq!(result.stations_found, 0);
    assert_eq!(result.duplicates_filtered, 2);
    assert_eq!(
        StationCsv::new(stations_csv(&dir)).read_all().unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_shared_station_counted_once() {
    let dir = TempDir::new().unwrap();
    let catalog = ScriptedCatalog::default()
        .with_line("13", "JR山手線", &["新宿", "渋谷"])
        .with_line("13", "銀座線", &["渋谷", "浅草"]);

    let mut coordinator = Coordinator::new(
        test_options(),
        Arc::new(catalog),
        seeded_store(&stations_csv(&dir)),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    let result = coordinator
        .run(&[Prefecture::new("13", "東京都")])
        .await
        .unwrap();

    assert_eq!(result.stations_found, 3);
    assert_eq!(result.duplicates_filtered, 1);
    assert_eq!(
        StationCsv::new(stations_csv(&dir)).read_all().unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_interrupt_then_resume_matches_uninterrupted_run() {
    let dir = TempDir::new().unwrap();
    let hierarchy = tokyo_osaka();
    let build = || {
        ScriptedCatalog::default()
            .with_line("13", "JR山手線", &["新宿", "渋谷"])
            .with_line("13", "銀座線", &["渋谷", "浅草"])
            .with_line("27", "御堂筋線", &["梅田", "難波"])
    };

    // Interrupted after the second line fetch
    let cancel = CancellationToken::new();
    let interrupted_catalog = Arc::new(build().cancel_after(2, cancel.clone()));
    let mut first = Coordinator::new(
        test_options(),
        interrupted_catalog.clone(),
        seeded_store(&stations_csv(&dir)),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    )
    .with_cancellation(cancel);
    let interrupted = first.run(&hierarchy).await.unwrap();

    assert_eq!(interrupted.status, CrawlStatus::Interrupted);
    assert_eq!(interrupted.lines_completed, 2);
    assert_eq!(interrupted_catalog.fetch_count("御堂筋線"), 0);
    assert!(checkpoint_path(&dir).exists());

    // Resume finishes only the remaining work
    let resumed_catalog = Arc::new(build());
    let options = CrawlOptions {
        resume: true,
        ..test_options()
    };
    let mut second = Coordinator::new(
        options,
        resumed_catalog.clone(),
        RecordStore::with_csv(stations_csv(&dir), DuplicatePolicy::FirstWriteWins),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    let resumed = second.run(&hierarchy).await.unwrap();

    assert_eq!(resumed.status, CrawlStatus::Completed);
    assert_eq!(resumed.stations_found, 2);
    assert_eq!(resumed_catalog.fetch_count("JR山手線"), 0);
    assert_eq!(resumed_catalog.fetch_count("銀座線"), 0);
    assert_eq!(resumed_catalog.fetch_count("御堂筋線"), 1);
    assert!(!checkpoint_path(&dir).exists());

    // Same key set as a single uninterrupted run
    let reference_dir = TempDir::new().unwrap();
    let mut reference = Coordinator::new(
        test_options(),
        Arc::new(build()),
        seeded_store(&stations_csv(&reference_dir)),
        Box::new(FileCheckpointStore::new(checkpoint_path(&reference_dir))),
    );
    reference.run(&hierarchy).await.unwrap();

    assert_eq!(
        stored_keys(&stations_csv(&dir)),
        stored_keys(&stations_csv(&reference_dir))
    );
    assert_eq!(
        StationCsv::new(stations_csv(&dir)).read_all().unwrap().len(),
        5
    );
}

#[tokio::test]
async fn test_failed_line_does_not_stop_the_crawl() {
    let dir = TempDir::new().unwrap();
    let catalog = ScriptedCatalog::default()
        .with_line("13", "JR山手線", &["新宿"])
        .with_line("13", "銀座線", &["浅草"])
        .with_line("27", "御堂筋線", &["梅田"])
        .failing_line("銀座線");

    let mut coordinator = Coordinator::new(
        test_options(),
        Arc::new(catalog),
        seeded_store(&stations_csv(&dir)),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    let result = coordinator.run(&tokyo_osaka()).await.unwrap();

    assert_eq!(result.status, CrawlStatus::Completed);
    assert_eq!(result.errors, 1);
    assert_eq!(result.stations_found, 2);
    assert_eq!(result.failed_nodes.len(), 1);
    assert_eq!(result.failed_nodes[0].prefecture, "13");
    assert_eq!(result.failed_nodes[0].line.as_deref(), Some("銀座線"));

    let progress = coordinator.progress();
    assert!(!progress.is_prefecture_complete("13"));
    assert!(progress.is_line_complete("13", "JR山手線"));
    assert!(!progress.is_line_complete("13", "銀座線"));
    assert!(progress.is_prefecture_complete("27"));
}

#[tokio::test]
async fn test_failed_line_listing_counts_one_error() {
    let dir = TempDir::new().unwrap();
    let catalog = ScriptedCatalog::default()
        .with_line("13", "JR山手線", &["新宿"])
        .with_line("27", "御堂筋線", &["梅田"])
        .failing_listing("13");

    let mut coordinator = Coordinator::new(
        test_options(),
        Arc::new(catalog),
        seeded_store(&stations_csv(&dir)),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    let result = coordinator.run(&tokyo_osaka()).await.unwrap();

    assert_eq!(result.errors, 1);
    assert_eq!(result.stations_found, 1);
    assert_eq!(result.failed_nodes[0].line, None);
    assert!(!coordinator.progress().is_prefecture_complete("13"));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let dir = TempDir::new().unwrap();
    let catalog = Arc::new(
        ScriptedCatalog::default()
            .with_line("13", "JR山手線", &["新宿"])
            .flaky_line("JR山手線", 1),
    );

    let mut coordinator = Coordinator::new(
        test_options(),
        catalog.clone(),
        seeded_store(&stations_csv(&dir)),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    let result = coordinator
        .run(&[Prefecture::new("13", "東京都")])
        .await
        .unwrap();

    assert_eq!(result.errors, 0);
    assert_eq!(result.stations_found, 1);
    assert_eq!(catalog.fetch_count("JR山手線"), 2);
}

#[tokio::test]
async fn test_slow_line_times_out() {
    let dir = TempDir::new().unwrap();
    let catalog = Arc::new(
        ScriptedCatalog::default()
            .with_line("13", "JR山手線", &["新宿"])
            .with_line("13", "銀座線", &["浅草"])
            .slow_line("銀座線"),
    );
    let options = CrawlOptions {
        request_timeout: Duration::from_millis(50),
        ..test_options()
    };

    let mut coordinator = Coordinator::new(
        options,
        catalog.clone(),
        seeded_store(&stations_csv(&dir)),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    let result = coordinator
        .run(&[Prefecture::new("13", "東京都")])
        .await
        .unwrap();

    assert_eq!(result.errors, 1);
    assert_eq!(result.stations_found, 1);
    // One attempt plus one retry
    assert_eq!(catalog.fetch_count("銀座線"), 2);
    assert!(result.failed_nodes[0].message.contains("timed out"));
}

#[tokio::test]
async fn test_checkpoint_written_every_interval() {
    let catalog = ScriptedCatalog::default()
        .with_line("13", "JR山手線", &["新宿"])
        .with_line("13", "銀座線", &["浅草"])
        .with_line("13", "丸ノ内線", &["池袋"]);
    let checkpoints = RecordingCheckpoints::default();
    let options = CrawlOptions {
        checkpoint_interval: 2,
        ..test_options()
    };

    let mut coordinator = Coordinator::new(
        options,
        Arc::new(catalog),
        RecordStore::in_memory(DuplicatePolicy::FirstWriteWins),
        Box::new(checkpoints.clone()),
    );
    let result = coordinator
        .run(&[Prefecture::new("13", "東京都")])
        .await
        .unwrap();

    assert_eq!(result.status, CrawlStatus::Completed);
    // One periodic checkpoint after the second accepted station, one final
    assert_eq!(*checkpoints.saved_lines.lock().unwrap(), vec![2, 3]);
    assert_eq!(*checkpoints.clears.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_checkpoint_write_failure_fails_the_run() {
    let catalog = ScriptedCatalog::default()
        .with_line("13", "JR山手線", &["新宿"])
        .with_line("27", "御堂筋線", &["梅田"]);
    let options = CrawlOptions {
        checkpoint_interval: 1,
        ..test_options()
    };

    let mut coordinator = Coordinator::new(
        options,
        Arc::new(catalog),
        RecordStore::in_memory(DuplicatePolicy::FirstWriteWins),
        Box::new(FailingCheckpoints),
    );
    let result = coordinator.run(&tokyo_osaka()).await.unwrap();

    assert_eq!(result.status, CrawlStatus::Failed);
    assert!(result
        .failure
        .as_deref()
        .unwrap()
        .contains("No space left on device"));
    // The run stops at the first failed checkpoint
    assert_eq!(result.lines_completed, 1);
}

#[tokio::test]
async fn test_resume_with_corrupt_checkpoint_is_an_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(checkpoint_path(&dir), "{ not json").unwrap();
    let catalog = ScriptedCatalog::default().with_line("13", "JR山手線", &["新宿"]);
    let options = CrawlOptions {
        resume: true,
        ..test_options()
    };

    let mut coordinator = Coordinator::new(
        options,
        Arc::new(catalog),
        RecordStore::with_csv(stations_csv(&dir), DuplicatePolicy::FirstWriteWins),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    let err = coordinator
        .run(&[Prefecture::new("13", "東京都")])
        .await
        .unwrap_err();

    match err {
        AtlasError::Storage(e) => assert!(e.is_corrupt_checkpoint()),
        other => panic!("expected a storage error, got {other}"),
    }
    assert!(!stations_csv(&dir).exists());
}

#[tokio::test]
async fn test_resume_without_checkpoint_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let catalog = ScriptedCatalog::default().with_line("13", "JR山手線", &["新宿"]);
    let options = CrawlOptions {
        resume: true,
        ..test_options()
    };

    let mut coordinator = Coordinator::new(
        options,
        Arc::new(catalog),
        RecordStore::with_csv(stations_csv(&dir), DuplicatePolicy::FirstWriteWins),
        Box::new(FileCheckpointStore::new(checkpoint_path(&dir))),
    );
    let result = coordinator
        .run(&[Prefecture::new("13", "東京都")])
        .await
        .unwrap();

    assert_eq!(result.status, CrawlStatus::Completed);
    assert_eq!(result.stations_found, 1);
}

#[tokio::test]
async fn test_blank_names_are_rejected() {
    let catalog = ScriptedCatalog::default().with_line("13", "JR山手線", &["新宿", "  "]);

    let mut coordinator = Coordinator::new(
        test_options(),
        Arc::new(catalog),
        RecordStore::in_memory(DuplicatePolicy::FirstWriteWins),
        Box::new(RecordingCheckpoints::default()),
    );
    let result = coordinator
        .run(&[Prefecture::new("13", "東京都")])
        .await
        .unwrap();

    assert_eq!(result.stations_found, 1);
    assert_eq!(result.rejected, 1);
    assert_eq!(coordinator.records().len(), 1);
}
