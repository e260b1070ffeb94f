//! Rendering of search hits and station listings

use crate::search::SearchHit;
use crate::station::Station;
use crate::storage::{StationRow, StorageError, STATION_COLUMNS};
use std::fmt::Write as _;

/// Output format for station listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown format '{}' (expected table, json or csv)", other)),
        }
    }
}

/// Renders stations in the requested format
pub fn render_stations(stations: &[&Station], format: OutputFormat) -> Result<String, StorageError> {
    match format {
        OutputFormat::Table => Ok(render_table(stations)),
        OutputFormat::Json => serde_json::to_string_pretty(stations)
            .map_err(|e| StorageError::Serialization(e.to_string())),
        OutputFormat::Csv => render_csv(stations),
    }
}

/// One line per station: name, code, line, prefecture
pub fn render_table(stations: &[&Station]) -> String {
    let mut out = format!("Stations ({})\n", stations.len());
    for station in stations {
        let _ = writeln!(
            out,
            "  {}\t{}\t{}\t{}",
            station.name,
            station.station_code.as_deref().unwrap_or("-"),
            station.line_name.as_deref().unwrap_or("-"),
            station.prefecture.as_deref().unwrap_or("-"),
        );
    }
    out
}

/// Stations in the persisted CSV layout, header included
pub fn render_csv(stations: &[&Station]) -> Result<String, StorageError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    let csv_error = |e: csv::Error| StorageError::Serialization(e.to_string());

    writer.write_record(STATION_COLUMNS).map_err(csv_error)?;
    for station in stations {
        let row = StationRow::from_station(station).map_err(StorageError::Serialization)?;
        writer.serialize(row).map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Search results, best first, with scores when the query asked for them
pub fn render_hits(query: &str, hits: &[SearchHit<'_>]) -> String {
    if hits.is_empty() {
        return format!("No stations found matching '{}'\n", query);
    }

    let mut out = format!("Stations matching '{}' ({})\n", query, hits.len());
    for hit in hits {
        let station = hit.station;
        let score = hit
            .score
            .map(|s| format!("[{:5.1}] ", s))
            .unwrap_or_default();
        let aliases = if station.aliases.is_empty() {
            String::new()
        } else {
            format!(" ({})", station.aliases.join(", "))
        };
        let _ = writeln!(
            out,
            "  {}{}{}\t{}\t{}",
            score,
            station.name,
            aliases,
            station.line_name.as_deref().unwrap_or("-"),
            station.prefecture.as_deref().unwrap_or("-"),
        );
    }
    out
}
