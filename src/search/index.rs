//! Ranked station lookup
//!
//! The index is a borrowed view over the record store's current contents and keeps no state of
//! its own, so it is rebuilt for every query at no cost.

use crate::search::query::{SearchError, SearchQuery};
use crate::search::similarity::{LevenshteinRatio, Similarity};
use crate::station::{normalize_component, Station};
use std::cmp::Ordering;

/// Default upper bound on the number of hits returned
pub const DEFAULT_MAX_LIMIT: usize = 100;

/// A search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<'a> {
    pub station: &'a Station,

    /// Match score in `[0, 100]`, present when the query asked for scores
    pub score: Option<f64>,
}

/// Search and listing over a slice of stations
pub struct StationIndex<'a> {
    stations: &'a [Station],
    similarity: Box<dyn Similarity>,
    max_limit: usize,
}

impl<'a> StationIndex<'a> {
    /// Creates an index using Levenshtein ratio scoring
    pub fn new(stations: &'a [Station]) -> Self {
        Self {
            stations,
            similarity: Box::new(LevenshteinRatio),
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }

    pub fn with_similarity(mut self, similarity: Box<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Finds stations matching `query`
    ///
    /// # Matching
    ///
    /// - **Exact:** case-normalized equality on the name or any alias; every hit scores 100 and
    ///   hits keep insertion order
    /// - **Fuzzy:** each station scores the best similarity over its name and aliases; stations
    ///   below the threshold are dropped and the rest are ranked by descending score, ties
    ///   keeping insertion order
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<SearchHit>)` - At most `min(limit, max_limit)` hits
    /// * `Err(SearchError::InvalidQuery)` - The parameters were rejected; nothing was searched
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit<'a>>, SearchError> {
        let limit = query.validate(self.max_limit)?;
        let needle = normalize_component(&query.query);
        let prefecture = query.prefecture.as_deref().map(normalize_component);

        let candidates = self.stations.iter().filter(|station| match &prefecture {
            Some(wanted) => station
                .prefecture
                .as_deref()
                .is_some_and(|p| normalize_component(p) == *wanted),
            None => true,
        });

        let mut scored: Vec<(&'a Station, f64)> = if query.exact {
            candidates
                .filter(|station| {
                    station
                        .search_names()
                        .any(|name| normalize_component(name) == needle)
                })
                .map(|station| (station, 100.0))
                .collect()
        } else {
            let threshold = f64::from(query.threshold);
            candidates
                .filter_map(|station| {
                    let best = self.best_score(&needle, station);
                    (best >= threshold).then_some((station, best))
                })
                .collect()
        };

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(station, score)| SearchHit {
                station,
                score: query.include_scores.then_some(score),
            })
            .collect())
    }

    fn best_score(&self, needle: &str, station: &Station) -> f64 {
        station
            .search_names()
            .map(|name| self.similarity.score(needle, &normalize_component(name)))
            .fold(0.0, f64::max)
    }

    /// Lists stations in insertion order
    ///
    /// # Arguments
    ///
    /// * `prefecture` - Keep stations whose prefecture equals this (case-normalized)
    /// * `line` - Keep stations whose line name or any serving line contains this
    ///   (case-insensitive)
    /// * `limit` - Maximum number of stations returned
    pub fn list(
        &self,
        prefecture: Option<&str>,
        line: Option<&str>,
        limit: usize,
    ) -> Vec<&'a Station> {
        let prefecture = prefecture.map(normalize_component);
        let line = line.map(normalize_component);

        self.stations
            .iter()
            .filter(|station| match &prefecture {
                Some(wanted) => station
                    .prefecture
                    .as_deref()
                    .is_some_and(|p| normalize_component(p) == *wanted),
                None => true,
            })
            .filter(|station| match &line {
                Some(wanted) => station
                    .line_name
                    .iter()
                    .chain(station.line.all_lines.iter())
                    .any(|name| normalize_component(name).contains(wanted.as_str())),
                None => true,
            })
            .take(limit)
            .collect()
    }
}
