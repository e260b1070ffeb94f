//! Station records
//!
//! A [`Station`] is what the crawler collects and the search index serves. Identity for
//! deduplication is the normalized (name, prefecture) pair, see [`StationKey`].

mod normalize;

pub use normalize::{normalize_component, StationKey};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Geographic position of a station
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Metadata about the railway line a station was found on
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineMetadata {
    /// Kana reading of the line name
    pub name_kana: Option<String>,

    /// Line color (e.g. `#80C241`)
    pub color: Option<String>,

    /// Line classification (JR, Metro, Private, Other)
    pub line_type: Option<String>,

    /// Short railway company code (e.g. `JR-E`)
    pub company_code: Option<String>,

    /// Every line serving the station, in discovery order
    pub all_lines: Vec<String>,
}

/// A railway station record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Station {
    /// Station name, usually in Japanese script
    pub name: String,

    pub prefecture: Option<String>,
    pub city: Option<String>,
    pub railway_company: Option<String>,
    pub line_name: Option<String>,
    pub station_code: Option<String>,
    pub coordinates: Option<Coordinates>,

    /// Romanized or disambiguated alternative names
    pub aliases: Vec<String>,

    pub line: LineMetadata,

    /// Page the record was scraped from; not persisted
    #[serde(skip)]
    pub source_url: Option<String>,
}

impl Station {
    /// Creates a station with only a name set
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_prefecture(mut self, prefecture: impl Into<String>) -> Self {
        self.prefecture = Some(prefecture.into());
        self
    }

    pub fn with_line_name(mut self, line_name: impl Into<String>) -> Self {
        self.line_name = Some(line_name.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Returns the dedup key of this record
    pub fn key(&self) -> StationKey {
        StationKey::new(&self.name, self.prefecture.as_deref())
    }

    /// Returns true if the record has a usable (non-blank) name
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Iterates over the name followed by every alias
    pub fn search_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefecture {
            Some(prefecture) => write!(f, "{} ({})", self.name, prefecture),
            None => write!(f, "{}", self.name),
        }
    }
}
