//! HTTP catalog source
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Fetching prefecture, line and station pages from the transit site
//! - Error classification into [`FetchError`] kinds
//!
//! Retrying is not done here; the coordinator wraps every call in its retry policy.

use crate::config::UserAgentConfig;
use crate::crawler::parser::{
    company_code, company_from_line, extract_line_links, extract_station_details,
    extract_station_links, line_type_from_line,
};
use crate::crawler::source::{CatalogSource, FetchError, Prefecture, RailLine};
use crate::station::{LineMetadata, Station};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// Per-request timeouts are applied by the caller, so the client itself only bounds connects.
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use eki_atlas::config::UserAgentConfig;
/// use eki_atlas::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "EkiAtlas".to_string(),
///     crawler_version: "0.1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "ops@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`CatalogSource`] backed by the transit site
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    client: Client,
    base_url: Url,

    /// Pause before each station page request; `None` skips station pages entirely
    detail_delay: Option<Duration>,
}

impl HttpCatalogSource {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            detail_delay: None,
        }
    }

    /// Enables station page visits in [`CatalogSource::enrich_station`]
    pub fn with_station_details(mut self, delay: Duration) -> Self {
        self.detail_delay = Some(delay);
        self
    }

    /// URL of a prefecture's line listing: `{base}/station/pref/{id}`
    pub fn prefecture_url(&self, prefecture: &Prefecture) -> Result<Url, FetchError> {
        self.base_url
            .join(&format!("station/pref/{}", prefecture.id))
            .map_err(|e| FetchError::Parse {
                url: self.base_url.to_string(),
                message: e.to_string(),
            })
    }

    /// Fetches a page as text
    ///
    /// # Error Classification
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Request exceeds `timeout` | `Timeout` |
    /// | Non-2xx status | `Http` with status |
    /// | Connection / transport failure | `Http` without status |
    /// | Body is not valid UTF-8 | `Parse` |
    async fn fetch_text(&self, url: &Url, timeout: Duration) -> Result<String, FetchError> {
        let http_error = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Http {
                    url: url.to_string(),
                    status: e.status().map(|s| s.as_u16()),
                    message: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(http_error)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| FetchError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn list_lines(
        &self,
        prefecture: &Prefecture,
        timeout: Duration,
    ) -> Result<Vec<RailLine>, FetchError> {
        let url = self.prefecture_url(prefecture)?;
        let html = self.fetch_text(&url, timeout).await?;

        let lines: Vec<RailLine> = extract_line_links(&html, &url, &prefecture.id)
            .into_iter()
            .map(|link| RailLine::new(link.text, link.url))
            .collect();

        tracing::debug!("Found {} lines for {}", lines.len(), prefecture);
        Ok(lines)
    }

    async fn fetch_stations(
        &self,
        prefecture: &Prefecture,
        line: &RailLine,
        timeout: Duration,
    ) -> Result<Vec<Station>, FetchError> {
        let url = Url::parse(&line.locator).map_err(|e| FetchError::Parse {
            url: line.locator.clone(),
            message: e.to_string(),
        })?;
        let html = self.fetch_text(&url, timeout).await?;

        let company = company_from_line(&line.name);
        let stations: Vec<Station> = extract_station_links(&html, &url)
            .into_iter()
            .map(|link| Station {
                name: link.name,
                prefecture: Some(prefecture.name.clone()),
                railway_company: Some(company.to_string()),
                line_name: Some(line.name.clone()),
                station_code: link.station_id,
                line: LineMetadata {
                    line_type: Some(line_type_from_line(&line.name).to_string()),
                    company_code: Some(company_code(company).to_string()),
                    all_lines: vec![line.name.clone()],
                    ..LineMetadata::default()
                },
                source_url: Some(link.url),
                ..Station::default()
            })
            .collect();

        tracing::debug!("Found {} stations on {}", stations.len(), line.name);
        Ok(stations)
    }

    async fn enrich_station(&self, mut station: Station, timeout: Duration) -> Station {
        let Some(delay) = self.detail_delay else {
            return station;
        };
        let Some(url) = station.source_url.as_deref().and_then(|u| Url::parse(u).ok()) else {
            return station;
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.fetch_text(&url, timeout).await {
            Ok(html) => {
                extract_station_details(&html).apply_to(&mut station);
                tracing::trace!("Added station page details for {}", station.name);
            }
            Err(e) => tracing::debug!("Keeping line listing data for {}: {}", station.name, e),
        }
        station
    }
}
