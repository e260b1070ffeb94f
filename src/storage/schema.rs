//! CSV schema for persisted station records
//!
//! Column order is fixed by [`STATION_COLUMNS`]. List-valued fields (`aliases`, `all_lines`)
//! are stored as JSON arrays of strings inside a single cell.

use crate::station::{Coordinates, LineMetadata, Station};
use serde::{Deserialize, Serialize};

/// Header row of the stations CSV file
pub const STATION_COLUMNS: [&str; 14] = [
    "name",
    "prefecture",
    "city",
    "railway_company",
    "line_name",
    "station_code",
    "latitude",
    "longitude",
    "aliases",
    "line_name_kana",
    "line_color",
    "line_type",
    "company_code",
    "all_lines",
];

/// One CSV row, every cell as text
///
/// Field order must match [`STATION_COLUMNS`]; rows are serialized without headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct StationRow {
    pub name: String,
    #[serde(default)]
    pub prefecture: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub railway_company: String,
    #[serde(default)]
    pub line_name: String,
    #[serde(default)]
    pub station_code: String,
    #[serde(default)]
    pub latitude: String,
    #[serde(default)]
    pub longitude: String,
    #[serde(default)]
    pub aliases: String,
    #[serde(default)]
    pub line_name_kana: String,
    #[serde(default)]
    pub line_color: String,
    #[serde(default)]
    pub line_type: String,
    #[serde(default)]
    pub company_code: String,
    #[serde(default)]
    pub all_lines: String,
}

impl StationRow {
    /// Converts a station into its row form
    pub fn from_station(station: &Station) -> Result<Self, String> {
        let (latitude, longitude) = match station.coordinates {
            Some(c) => (c.latitude.to_string(), c.longitude.to_string()),
            None => (String::new(), String::new()),
        };

        Ok(Self {
            name: station.name.clone(),
            prefecture: text(&station.prefecture),
            city: text(&station.city),
            railway_company: text(&station.railway_company),
            line_name: text(&station.line_name),
            station_code: text(&station.station_code),
            latitude,
            longitude,
            aliases: encode_list(&station.aliases)?,
            line_name_kana: text(&station.line.name_kana),
            line_color: text(&station.line.color),
            line_type: text(&station.line.line_type),
            company_code: text(&station.line.company_code),
            all_lines: encode_list(&station.line.all_lines)?,
        })
    }

    /// Converts a row back into a station
    ///
    /// # Returns
    ///
    /// * `Ok(Station)` - The decoded record
    /// * `Err(String)` - A cell could not be decoded (bad coordinate, malformed list)
    pub fn into_station(self) -> Result<Station, String> {
        let coordinates = match (optional(self.latitude), optional(self.longitude)) {
            (Some(lat), Some(lon)) => Some(Coordinates {
                latitude: parse_coordinate("latitude", &lat)?,
                longitude: parse_coordinate("longitude", &lon)?,
            }),
            (None, None) => None,
            _ => return Err("latitude and longitude must both be set or both be empty".into()),
        };

        Ok(Station {
            name: self.name,
            prefecture: optional(self.prefecture),
            city: optional(self.city),
            railway_company: optional(self.railway_company),
            line_name: optional(self.line_name),
            station_code: optional(self.station_code),
            coordinates,
            aliases: decode_list(&self.aliases)?,
            line: LineMetadata {
                name_kana: optional(self.line_name_kana),
                color: optional(self.line_color),
                line_type: optional(self.line_type),
                company_code: optional(self.company_code),
                all_lines: decode_list(&self.all_lines)?,
            },
            source_url: None,
        })
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn optional(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_coordinate(column: &str, value: &str) -> Result<f64, String> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid {} '{}': {}", column, value, e))
}

fn encode_list(values: &[String]) -> Result<String, String> {
    if values.is_empty() {
        return Ok(String::new());
    }
    serde_json::to_string(values).map_err(|e| e.to_string())
}

/// Decodes a list cell
///
/// JSON arrays are the current format. Cells written by older exports used `|` as the
/// separator; those are still accepted.
fn decode_list(cell: &str) -> Result<Vec<String>, String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(Vec::new());
    }
    if cell.starts_with('[') {
        return serde_json::from_str(cell).map_err(|e| format!("malformed list '{}': {}", cell, e));
    }
    Ok(cell
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}
