use crate::config::prefectures::all_prefectures;
use crate::crawler::Prefecture;
use crate::search::SimilarityAlgorithm;
use crate::storage::DuplicatePolicy;
use crate::ConfigError;
use serde::Deserialize;
use url::Url;

/// Main configuration structure for Eki-Atlas
///
/// Every section is optional; missing sections and keys take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub search: SearchConfig,

    /// Prefectures to crawl, in order; empty means all 47
    #[serde(default, rename = "prefecture")]
    pub prefectures: Vec<Prefecture>,
}

impl Config {
    /// The ordered crawl hierarchy
    pub fn hierarchy(&self) -> Vec<Prefecture> {
        if self.prefectures.is_empty() {
            all_prefectures()
        } else {
            self.prefectures.clone()
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Accepted records between checkpoints
    #[serde(rename = "checkpoint-interval")]
    pub checkpoint_interval: u64,

    /// Upper bound on a single request (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Retries after a failed request
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First backoff delay (milliseconds), doubled on each retry
    #[serde(rename = "retry-base-delay-ms")]
    pub retry_base_delay_ms: u64,

    /// Backoff cap (milliseconds)
    #[serde(rename = "retry-max-delay-ms")]
    pub retry_max_delay_ms: u64,

    /// Pause between request batches (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Lines fetched concurrently within a prefecture
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: usize,

    /// Only crawl the first N lines of each prefecture
    #[serde(rename = "max-lines-per-prefecture")]
    pub max_lines_per_prefecture: Option<usize>,

    /// How often the CLI logs live progress (seconds)
    #[serde(rename = "progress-interval-secs")]
    pub progress_interval_secs: u64,

    #[serde(rename = "duplicate-policy")]
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 50,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 10_000,
            request_delay_ms: 1000,
            max_concurrent_fetches: 1,
            max_lines_per_prefecture: None,
            progress_interval_secs: 10,
            duplicate_policy: DuplicatePolicy::FirstWriteWins,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "EkiAtlas".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "ops@example.com".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the stations CSV file
    #[serde(rename = "stations-path")]
    pub stations_path: String,

    /// Path to the crawl checkpoint file
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            stations_path: "data/stations.csv".to_string(),
            checkpoint_path: "data/crawl_state.json".to_string(),
        }
    }
}

/// Catalog source configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Visit each new station's own page for city, coordinates, aliases and served lines
    #[serde(rename = "station-details")]
    pub station_details: bool,

    /// Pause before each station page request (milliseconds)
    #[serde(rename = "detail-delay-ms")]
    pub detail_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://transit.yahoo.co.jp".to_string(),
            station_details: true,
            detail_delay_ms: 500,
        }
    }
}

impl SourceConfig {
    /// Parsed base URL, always ending in `/` so relative paths join beneath it
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Search defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    #[serde(rename = "default-limit")]
    pub default_limit: usize,

    /// Larger requested limits are clamped to this
    #[serde(rename = "max-limit")]
    pub max_limit: usize,

    #[serde(rename = "default-threshold")]
    pub default_threshold: i32,

    pub algorithm: SimilarityAlgorithm,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            default_threshold: 70,
            algorithm: SimilarityAlgorithm::default(),
        }
    }
}
