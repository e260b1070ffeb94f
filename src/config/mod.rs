//! Configuration module for Eki-Atlas
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use eki_atlas::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("eki-atlas.toml")).unwrap();
//! println!("Crawling {} prefectures", config.hierarchy().len());
//! ```

mod parser;
mod prefectures;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, OutputConfig, SearchConfig, SourceConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_config, resolve_config,
    DEFAULT_CONFIG_PATH,
};
pub use prefectures::{all_prefectures, find_prefecture};
