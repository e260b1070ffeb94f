//! Eki-Atlas main entry point
//!
//! This is the command-line interface for the Eki-Atlas station catalog crawler.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use eki_atlas::config::{find_prefecture, resolve_config, Config};
use eki_atlas::crawler::{build_coordinator, CrawlOptions, Prefecture};
use eki_atlas::output::{
    print_crawl_result, print_statistics, render_hits, render_stations, OutputFormat,
    StationStatistics,
};
use eki_atlas::search::{SearchQuery, StationIndex};
use eki_atlas::state::CrawlStatus;
use eki_atlas::storage::RecordStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Eki-Atlas: a resumable railway station catalog crawler
///
/// Eki-Atlas walks the station catalog prefecture by prefecture and line by line,
/// keeps a deduplicated CSV of every station it finds, and answers fuzzy
/// station-name searches over that file.
#[derive(Parser, Debug)]
#[command(name = "eki-atlas")]
#[command(version)]
#[command(about = "A resumable railway station catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults to ./eki-atlas.toml if present)
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Stations CSV to use instead of the configured one
    #[arg(long, global = true, value_name = "CSV")]
    data: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the station catalog
    Crawl {
        /// Continue from the last checkpoint
        #[arg(long)]
        resume: bool,

        /// Accepted stations between checkpoints
        #[arg(long, value_name = "N")]
        checkpoint_interval: Option<u64>,

        /// Only crawl the first N lines of each prefecture
        #[arg(long, value_name = "N")]
        max_lines: Option<usize>,

        /// Per-request timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Restrict the crawl to these prefectures (code or name, repeatable)
        #[arg(short, long = "prefecture", value_name = "PREFECTURE")]
        prefectures: Vec<String>,
    },

    /// Search stations by name
    Search {
        /// Station name or alias
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity score (0-100)
        #[arg(long, value_name = "SCORE", allow_negative_numbers = true)]
        fuzzy_threshold: Option<i32>,

        /// Exact (case-insensitive) name match only
        #[arg(long)]
        exact: bool,

        /// Show match scores
        #[arg(long)]
        show_scores: bool,

        /// Only stations in this prefecture
        #[arg(short, long)]
        prefecture: Option<String>,
    },

    /// List stored stations
    List {
        /// Only stations in this prefecture
        #[arg(short, long)]
        prefecture: Option<String>,

        /// Only stations on lines whose name contains this
        #[arg(long)]
        line: Option<String>,

        /// Maximum number of stations
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Output format: table, json or csv
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show statistics about the station database
    Info,

    /// Write the deduplicated station database to a CSV file
    Export {
        /// Destination path
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let (mut config, config_hash) =
        resolve_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(hash) = &config_hash {
        tracing::debug!("Configuration loaded (hash: {})", hash);
    }
    if let Some(data) = &cli.data {
        config.output.stations_path = data.display().to_string();
    }

    match cli.command {
        Command::Crawl {
            resume,
            checkpoint_interval,
            max_lines,
            timeout,
            prefectures,
        } => {
            let mut options = CrawlOptions::from_config(&config, config_hash);
            options.resume = resume;
            if let Some(interval) = checkpoint_interval {
                options.checkpoint_interval = interval.max(1);
            }
            if max_lines.is_some() {
                options.max_lines_per_prefecture = max_lines;
            }
            if let Some(secs) = timeout {
                options.request_timeout = Duration::from_secs(secs.max(1));
            }
            let hierarchy = select_prefectures(&config, &prefectures)?;
            handle_crawl(&config, options, hierarchy).await
        }
        Command::Search {
            query,
            limit,
            fuzzy_threshold,
            exact,
            show_scores,
            prefecture,
        } => {
            let mut query = SearchQuery::new(query)
                .limit(limit.unwrap_or(config.search.default_limit))
                .threshold(fuzzy_threshold.unwrap_or(config.search.default_threshold))
                .exact(exact)
                .include_scores(show_scores);
            if let Some(prefecture) = prefecture {
                query = query.prefecture(prefecture);
            }
            handle_search(&config, &query)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::List {
            prefecture,
            line,
            limit,
            format,
        } => {
            handle_list(&config, prefecture.as_deref(), line.as_deref(), limit, format)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Info => {
            handle_info(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Export { output } => {
            handle_export(&config, &output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("eki_atlas=info,warn"),
            1 => EnvFilter::new("eki_atlas=debug,info"),
            2 => EnvFilter::new("eki_atlas=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Resolves `--prefecture` arguments against the built-in table
fn select_prefectures(config: &Config, requested: &[String]) -> anyhow::Result<Vec<Prefecture>> {
    if requested.is_empty() {
        return Ok(config.hierarchy());
    }
    requested
        .iter()
        .map(|key| {
            find_prefecture(key).with_context(|| format!("Unknown prefecture: {}", key))
        })
        .collect()
}

/// Loads the stations CSV into a record store
fn open_records(config: &Config) -> anyhow::Result<RecordStore> {
    let mut records = RecordStore::with_csv(
        &config.output.stations_path,
        config.crawler.duplicate_policy,
    );
    let loaded = records
        .load_existing()
        .with_context(|| format!("Failed to read {}", config.output.stations_path))?;
    tracing::debug!("Loaded {} stations from {}", loaded, config.output.stations_path);
    Ok(records)
}

/// Handles the crawl subcommand
async fn handle_crawl(
    config: &Config,
    options: CrawlOptions,
    hierarchy: Vec<Prefecture>,
) -> anyhow::Result<ExitCode> {
    if options.resume {
        tracing::info!("Resuming crawl from {}", config.output.checkpoint_path);
    } else {
        tracing::info!("Starting fresh crawl");
    }
    tracing::info!(
        "Crawling {} prefectures into {}",
        hierarchy.len(),
        config.output.stations_path
    );

    let mut coordinator =
        build_coordinator(config, options).context("Failed to set up the crawler")?;

    // Ctrl-C stops the crawl at the next safe point; progress is checkpointed
    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, saving progress...");
            cancel.cancel();
        }
    });

    let mut receiver = coordinator.subscribe();
    let interval = Duration::from_secs(config.crawler.progress_interval_secs.max(1));
    let reporter = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = receiver.borrow_and_update().clone();
            if report.status.is_terminal() {
                break;
            }
            tracing::info!("{}", report);
        }
    });

    let result = coordinator.run(&hierarchy).await;
    reporter.abort();
    let result = result.context("Crawl could not start")?;

    print_crawl_result(&result);
    match result.status {
        CrawlStatus::Completed => Ok(ExitCode::SUCCESS),
        CrawlStatus::Interrupted => {
            println!("\nRun again with --resume to continue.");
            Ok(ExitCode::SUCCESS)
        }
        CrawlStatus::Failed | CrawlStatus::Running => Ok(ExitCode::FAILURE),
    }
}

/// Handles the search subcommand
fn handle_search(config: &Config, query: &SearchQuery) -> anyhow::Result<()> {
    let records = open_records(config)?;
    if records.is_empty() {
        bail!(
            "No stations in {}; run `eki-atlas crawl` first",
            config.output.stations_path
        );
    }

    let index = StationIndex::new(records.all())
        .with_similarity(config.search.algorithm.build())
        .with_max_limit(config.search.max_limit);
    let hits = index.search(query)?;

    print!("{}", render_hits(&query.query, &hits));
    Ok(())
}

/// Handles the list subcommand
fn handle_list(
    config: &Config,
    prefecture: Option<&str>,
    line: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let records = open_records(config)?;
    let index = StationIndex::new(records.all());
    let stations = index.list(prefecture, line, limit);

    let rendered = render_stations(&stations, format)?;
    if rendered.ends_with('\n') {
        print!("{}", rendered);
    } else {
        println!("{}", rendered);
    }
    Ok(())
}

/// Handles the info subcommand
fn handle_info(config: &Config) -> anyhow::Result<()> {
    let records = open_records(config)?;
    let stats = StationStatistics::from_stations(records.all());
    print_statistics(&stats, &config.output.stations_path);
    Ok(())
}

/// Handles the export subcommand
fn handle_export(config: &Config, output: &Path) -> anyhow::Result<()> {
    let records = open_records(config)?;
    let written = records
        .export(output)
        .with_context(|| format!("Failed to export to {}", output.display()))?;

    println!("✓ Exported {} stations to: {}", written, output.display());
    Ok(())
}
