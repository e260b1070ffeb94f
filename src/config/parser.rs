use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Config file looked up when none is named explicitly
pub const DEFAULT_CONFIG_PATH: &str = "eki-atlas.toml";

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use eki_atlas::config::load_config;
///
/// let config = load_config(Path::new("eki-atlas.toml")).unwrap();
/// println!("Checkpoint every {} stations", config.crawler.checkpoint_interval);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is used to detect if the configuration has changed between crawl runs.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

/// Resolves the configuration for a CLI invocation
///
/// An explicitly named file must exist. Without one, [`DEFAULT_CONFIG_PATH`] is used if present
/// and the built-in defaults otherwise.
///
/// # Returns
///
/// * `Ok((Config, Some(hash)))` - Loaded from a file
/// * `Ok((Config, None))` - No file; defaults
/// * `Err(ConfigError)` - The file could not be read, parsed or validated
pub fn resolve_config(explicit: Option<&Path>) -> Result<(Config, Option<String>), ConfigError> {
    let path = match explicit {
        Some(path) => path,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if !default.exists() {
                tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
                return Ok((Config::default(), None));
            }
            default
        }
    };

    let (config, hash) = load_config_with_hash(path)?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok((config, Some(hash)))
}
