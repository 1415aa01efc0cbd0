//! Importance and retrieval scoring
//!
//! Both scores are fixed-weight blends of signals in 0.0 - 1.0.

/// Days after which recency bottoms out at 0
const RECENCY_HORIZON_DAYS: f64 = 365.0;

/// Accesses at which the access-frequency signal saturates
const ACCESS_SATURATION: f64 = 10.0;

/// Importance weights
const W_RECENCY: f64 = 0.3;
const W_ACCESS: f64 = 0.2;
const W_UNIQUENESS: f64 = 0.2;
const W_EMOTION: f64 = 0.15;
const W_RELIABILITY: f64 = 0.15;

/// Retrieval weights
const W_IMPORTANCE: f64 = 0.3;
const W_SIMILARITY: f64 = 0.4;
const W_KEYWORDS: f64 = 0.2;
const W_FRESHNESS: f64 = 0.1;

/// Linear recency: 1.0 now, 0.0 at a year or older
pub fn recency(age_days: f64) -> f64 {
    (1.0 - age_days.max(0.0) / RECENCY_HORIZON_DAYS).max(0.0)
}

/// Signals feeding the importance of a new memory
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceSignals {
    /// Age of the remembered event, in days
    pub age_days: f64,
    /// Times the memory has been accessed
    pub access_count: u64,
    /// Highest similarity to an existing memory (0.0 when none)
    pub top_similarity: f64,
    /// Sentiment, -1.0 - 1.0
    pub sentiment: f64,
    /// Reliability of the source
    pub reliability: f64,
}

impl ImportanceSignals {
    /// Weighted importance, clamped to 0.0 - 1.0
    pub fn score(&self) -> f64 {
        let access = (self.access_count as f64 / ACCESS_SATURATION).min(1.0);
        let uniqueness = 1.0 - self.top_similarity.clamp(0.0, 1.0);

        (W_RECENCY * recency(self.age_days)
            + W_ACCESS * access
            + W_UNIQUENESS * uniqueness
            + W_EMOTION * self.sentiment.abs().min(1.0)
            + W_RELIABILITY * self.reliability.clamp(0.0, 1.0))
        .clamp(0.0, 1.0)
    }
}

/// Relevance of a candidate to a query
pub fn retrieval_score(importance: f64, similarity: f64, keyword_match: f64, age_days: f64) -> f64 {
    W_IMPORTANCE * importance
        + W_SIMILARITY * similarity.max(0.0)
        + W_KEYWORDS * keyword_match
        + W_FRESHNESS * recency(age_days)
}
