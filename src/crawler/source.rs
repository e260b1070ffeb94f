//! Catalog source abstraction
//!
//! The coordinator never talks to the network directly. It asks a [`CatalogSource`] for the
//! lines of a prefecture and for the stations of a line, and treats every failure as a
//! [`FetchError`] that may be retried.

use crate::station::Station;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Top level node of the crawl hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prefecture {
    /// Stable identifier (JIS X 0401 code for Japanese prefectures, e.g. `13`)
    pub id: String,

    /// Display name (e.g. `東京都`)
    pub name: String,
}

impl Prefecture {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Prefecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// A railway line within a prefecture
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RailLine {
    /// Line name; also the line's identity within its prefecture
    pub name: String,

    /// Source-specific address of the line's station listing (a URL for HTTP sources)
    pub locator: String,
}

impl RailLine {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }
}

/// Classification of a fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Http,
    Parse,
}

/// Errors returned by a catalog source
///
/// All of these are recoverable: the coordinator retries them with backoff and, once retries
/// are exhausted, counts an error and moves on to the next node.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error fetching {url}: {message}")]
    Http {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Failed to parse {url}: {message}")]
    Parse { url: String, message: String },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Timeout(_) => FetchErrorKind::Timeout,
            Self::Http { .. } => FetchErrorKind::Http,
            Self::Parse { .. } => FetchErrorKind::Parse,
        }
    }

    /// HTTP status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            _ => None,
        }
    }
}

/// The fetch collaborator of the crawl
///
/// Implementations must be safe to call concurrently; the coordinator may have several line
/// fetches in flight at once.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Lists the railway lines of a prefecture, in catalog order
    async fn list_lines(
        &self,
        prefecture: &Prefecture,
        timeout: Duration,
    ) -> Result<Vec<RailLine>, FetchError>;

    /// Fetches the station candidates of one line
    async fn fetch_stations(
        &self,
        prefecture: &Prefecture,
        line: &RailLine,
        timeout: Duration,
    ) -> Result<Vec<Station>, FetchError>;

    /// Fills in what a station's own page adds to a line listing candidate
    ///
    /// Best effort: a station that cannot be improved comes back unchanged. The default does
    /// nothing.
    async fn enrich_station(&self, station: Station, _timeout: Duration) -> Station {
        station
    }
}

/// In-memory catalog, for tests and offline fixtures
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    lines: HashMap<String, Vec<(RailLine, Vec<Station>)>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line (and its stations) to a prefecture, after any lines already added
    pub fn with_line(
        mut self,
        prefecture_id: &str,
        line_name: &str,
        stations: Vec<Station>,
    ) -> Self {
        let line = RailLine::new(line_name, format!("static:{}/{}", prefecture_id, line_name));
        self.lines
            .entry(prefecture_id.to_string())
            .or_default()
            .push((line, stations));
        self
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn list_lines(
        &self,
        prefecture: &Prefecture,
        _timeout: Duration,
    ) -> Result<Vec<RailLine>, FetchError> {
        Ok(self
            .lines
            .get(&prefecture.id)
            .map(|lines| lines.iter().map(|(line, _)| line.clone()).collect())
            .unwrap_or_default())
    }

    async fn fetch_stations(
        &self,
        prefecture: &Prefecture,
        line: &RailLine,
        _timeout: Duration,
    ) -> Result<Vec<Station>, FetchError> {
        self.lines
            .get(&prefecture.id)
            .and_then(|lines| lines.iter().find(|(known, _)| known.name == line.name))
            .map(|(_, stations)| stations.clone())
            .ok_or_else(|| FetchError::Http {
                url: line.locator.clone(),
                status: Some(404),
                message: "unknown line".to_string(),
            })
    }
}
