//! Statistics over the station database
//!
//! This module provides functionality for summarizing the stored stations and
//! displaying the summary.

use crate::station::Station;
use std::collections::BTreeMap;

/// Label used for records without a prefecture or company
const UNKNOWN: &str = "(unknown)";

/// Station database summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationStatistics {
    /// Total number of stored stations
    pub total_stations: usize,

    /// Station count per prefecture
    pub by_prefecture: BTreeMap<String, usize>,

    /// Station count per railway company
    pub by_company: BTreeMap<String, usize>,

    /// Stations with known coordinates
    pub with_coordinates: usize,
}

impl StationStatistics {
    /// Summarizes a set of stations
    pub fn from_stations(stations: &[Station]) -> Self {
        let mut stats = Self {
            total_stations: stations.len(),
            ..Self::default()
        };

        for station in stations {
            let prefecture = station.prefecture.as_deref().unwrap_or(UNKNOWN);
            *stats.by_prefecture.entry(prefecture.to_string()).or_default() += 1;

            let company = station.railway_company.as_deref().unwrap_or(UNKNOWN);
            *stats.by_company.entry(company.to_string()).or_default() += 1;

            if station.coordinates.is_some() {
                stats.with_coordinates += 1;
            }
        }

        stats
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
/// * `source` - Where the stations were loaded from
pub fn print_statistics(stats: &StationStatistics, source: &str) {
    println!("=== Station Database ===\n");

    println!("Overview:");
    println!("  Database file: {}", source);
    println!("  Total stations: {}", stats.total_stations);
    println!("  Prefectures: {}", stats.by_prefecture.len());
    println!("  With coordinates: {}", stats.with_coordinates);
    println!();

    if !stats.by_prefecture.is_empty() {
        println!("Stations by Prefecture:");
        for (prefecture, count) in &stats.by_prefecture {
            println!("  {}: {}", prefecture, count);
        }
        println!();
    }

    if !stats.by_company.is_empty() {
        println!("Stations by Railway Company:");
        // Sort companies by count (descending)
        let mut company_counts: Vec<_> = stats.by_company.iter().collect();
        company_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (company, count) in company_counts {
            let percentage = (*count as f64 / stats.total_stations as f64) * 100.0;
            println!("  {}: {} ({:.1}%)", company, count, percentage);
        }
    }
}
