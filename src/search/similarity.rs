//! String similarity scoring
//!
//! Scores are on a 0-100 scale, 100 meaning identical. Inputs are compared as given; the index
//! normalizes them before calling in.

use serde::Deserialize;

/// A string similarity measure
pub trait Similarity: Send + Sync {
    /// Scores `a` against `b` in `[0, 100]`
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Normalized Levenshtein distance, as a percentage
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinRatio;

impl Similarity for LevenshteinRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(a, b) * 100.0
    }
}

/// Jaro-Winkler similarity, as a percentage; favors shared prefixes
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl Similarity for JaroWinkler {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(a, b) * 100.0
    }
}

/// Configurable choice of similarity measure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityAlgorithm {
    #[default]
    Levenshtein,
    JaroWinkler,
}

impl SimilarityAlgorithm {
    pub fn build(self) -> Box<dyn Similarity> {
        match self {
            Self::Levenshtein => Box::new(LevenshteinRatio),
            Self::JaroWinkler => Box::new(JaroWinkler),
        }
    }
}
