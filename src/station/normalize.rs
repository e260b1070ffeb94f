//! Dedup key normalization for station records
//!
//! Two records describe the same logical station when their names and prefectures agree after
//! trimming and lower-casing. Japanese script is left untouched, so `新宿` and `Shinjuku` are
//! different keys even though they name the same place.

use std::fmt;

/// Normalizes a single key component
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace (including the ideographic space U+3000)
/// 2. Lower-case using Unicode case mapping
///
/// Kana, kanji and other uncased characters pass through unchanged.
///
/// # Example
///
/// ```
/// use eki_atlas::station::normalize_component;
///
/// assert_eq!(normalize_component("  Shinjuku "), "shinjuku");
/// assert_eq!(normalize_component("新宿"), "新宿");
/// ```
pub fn normalize_component(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Canonical identity of a station: the normalized (name, prefecture) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationKey {
    name: String,
    prefecture: String,
}

impl StationKey {
    /// Builds a key from raw name and prefecture values
    ///
    /// A missing prefecture and a blank one produce the same key.
    pub fn new(name: &str, prefecture: Option<&str>) -> Self {
        Self {
            name: normalize_component(name),
            prefecture: prefecture.map(normalize_component).unwrap_or_default(),
        }
    }

    /// The normalized station name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normalized prefecture, or `None` when the record had none
    pub fn prefecture(&self) -> Option<&str> {
        if self.prefecture.is_empty() {
            None
        } else {
            Some(&self.prefecture)
        }
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefecture() {
            Some(prefecture) => write!(f, "{} ({})", self.name, prefecture),
            None => write!(f, "{}", self.name),
        }
    }
}
