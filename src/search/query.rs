//! Search query parameters and validation

use thiserror::Error;

/// Errors raised by search operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Parameters of a station search
///
/// Defaults: limit 10, threshold 70, fuzzy matching, no scores, no prefecture filter.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub limit: usize,

    /// Minimum fuzzy score, 0-100 inclusive; signed so that out-of-range input can be reported
    pub threshold: i32,

    /// Case-normalized equality on name or alias instead of fuzzy scoring
    pub exact: bool,

    /// Attach scores to the hits
    pub include_scores: bool,

    /// Only consider stations in this prefecture (case-normalized equality)
    pub prefecture: Option<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 10,
            threshold: 70,
            exact: false,
            include_scores: false,
            prefecture: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn threshold(mut self, threshold: i32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    pub fn include_scores(mut self, include_scores: bool) -> Self {
        self.include_scores = include_scores;
        self
    }

    pub fn prefecture(mut self, prefecture: impl Into<String>) -> Self {
        self.prefecture = Some(prefecture.into());
        self
    }

    /// Checks the parameters and returns the effective limit
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - `limit` clamped to `max_limit`
    /// * `Err(SearchError::InvalidQuery)` - Blank query, zero limit, or threshold outside 0-100
    pub fn validate(&self, max_limit: usize) -> Result<usize, SearchError> {
        if self.query.trim().is_empty() {
            return Err(SearchError::InvalidQuery("query cannot be empty".to_string()));
        }
        if self.limit == 0 {
            return Err(SearchError::InvalidQuery(
                "limit must be at least 1".to_string(),
            ));
        }
        if !(0..=100).contains(&self.threshold) {
            return Err(SearchError::InvalidQuery(format!(
                "fuzzy threshold must be between 0 and 100, got {}",
                self.threshold
            )));
        }
        Ok(self.limit.min(max_limit))
    }
}
