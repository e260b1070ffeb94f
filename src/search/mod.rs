//! Fuzzy station search
//!
//! # Components
//!
//! - `Similarity`: pluggable 0-100 string similarity (Levenshtein ratio, Jaro-Winkler)
//! - `SearchQuery`: query parameters and their validation
//! - `StationIndex`: ranked search and filtered listing over the stored stations

mod index;
mod query;
mod similarity;

pub use index::{SearchHit, StationIndex, DEFAULT_MAX_LIMIT};
pub use query::{SearchError, SearchQuery};
pub use similarity::{JaroWinkler, LevenshteinRatio, Similarity, SimilarityAlgorithm};
