use crate::config::types::{
    Config, CrawlerConfig, OutputConfig, SearchConfig, SourceConfig, UserAgentConfig,
};
use crate::crawler::Prefecture;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Upper bound on `max-concurrent-fetches`
const MAX_CONCURRENT_FETCHES: usize = 16;

/// Upper bound on `max-retries`
const MAX_RETRIES: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_source_config(&config.source)?;
    validate_search_config(&config.search)?;
    validate_prefectures(&config.prefectures)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(
            "checkpoint-interval must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.max_retries > MAX_RETRIES {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 0 and {}, got {}",
            MAX_RETRIES, config.max_retries
        )));
    }

    if config.retry_base_delay_ms < 1 {
        return Err(ConfigError::Validation(
            "retry-base-delay-ms must be >= 1".to_string(),
        ));
    }

    if config.retry_max_delay_ms < config.retry_base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry-max-delay-ms ({}) must be >= retry-base-delay-ms ({})",
            config.retry_max_delay_ms, config.retry_base_delay_ms
        )));
    }

    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > MAX_CONCURRENT_FETCHES
    {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-fetches must be between 1 and {}, got {}",
            MAX_CONCURRENT_FETCHES, config.max_concurrent_fetches
        )));
    }

    if config.max_lines_per_prefecture == Some(0) {
        return Err(ConfigError::Validation(
            "max-lines-per-prefecture must be >= 1 when set".to_string(),
        ));
    }

    if config.progress_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "progress-interval-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.stations_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "stations-path cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint-path cannot be empty".to_string(),
        ));
    }

    if config.stations_path == config.checkpoint_path {
        return Err(ConfigError::Validation(
            "stations-path and checkpoint-path must differ".to_string(),
        ));
    }

    Ok(())
}

/// Validates the catalog source
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = config.base_url()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            config.base_url
        )));
    }
    Ok(())
}

/// Validates search defaults
fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    if config.max_limit < 1 {
        return Err(ConfigError::Validation("max-limit must be >= 1".to_string()));
    }

    if config.default_limit < 1 || config.default_limit > config.max_limit {
        return Err(ConfigError::Validation(format!(
            "default-limit must be between 1 and max-limit ({}), got {}",
            config.max_limit, config.default_limit
        )));
    }

    if !(0..=100).contains(&config.default_threshold) {
        return Err(ConfigError::Validation(format!(
            "default-threshold must be between 0 and 100, got {}",
            config.default_threshold
        )));
    }

    Ok(())
}

/// Validates explicit prefecture entries
fn validate_prefectures(prefectures: &[Prefecture]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for prefecture in prefectures {
        if prefecture.id.trim().is_empty() || prefecture.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "prefecture entries need a non-empty id and name".to_string(),
            ));
        }
        if !seen.insert(prefecture.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "prefecture '{}' is listed more than once",
                prefecture.id
            )));
        }
    }
    Ok(())
}

/// Validates an email address (basic format check)
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact-email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let (local, domain) = email.split_once('@').ok_or_else(|| {
        ConfigError::Validation(format!("Invalid email format: '{}'", email))
    })?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    // Domain part should contain at least one dot
    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
