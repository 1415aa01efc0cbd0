//! Engine configuration
//!
//! Read once at construction. Values come from compiled-in defaults, an
//! optional JSON file, and `KEEPSAKE_*` environment overrides, in that order.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::memory::MemoryKind;

/// Configuration error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Config file is not valid JSON for this schema
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Values out of range
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Memory engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Days a memory survives without access, per kind
    pub retention_days: BTreeMap<MemoryKind, u32>,
    /// Memories at or above this importance are never pruned
    pub retention_importance_floor: f64,
    /// Compute importance from signals when the caller gives none
    pub compute_importance: bool,
    /// Importance used when computation is disabled
    pub default_importance: f64,
    /// Confidence used when the caller gives none
    pub default_confidence: f64,
    /// Source origin used when the caller gives none
    pub default_origin: String,
    /// Source reliability used when the caller gives none
    pub default_reliability: f64,
    /// Similarity at which a write merges into an existing memory
    pub dedup_threshold: f64,
    /// Neighbours inspected for write-time dedup
    pub dedup_neighbors: usize,
    /// Similarity at which consolidation clusters memories
    pub consolidation_threshold: f64,
    /// Candidates fetched per retrieval
    pub max_candidates: usize,
    /// Results returned per retrieval
    pub max_results: usize,
    /// Results must score strictly above this
    pub min_score: f64,
    /// Expected embedding model (checked against the provider when set)
    pub embedding_model: Option<String>,
    /// Expected embedding dimension (checked against the provider when set)
    pub embedding_dimensions: Option<usize>,
    /// Texts per provider batch call
    pub embedding_batch_size: usize,
    /// Provider call timeout in milliseconds
    pub embedding_timeout_ms: u64,
    /// Embedding cache entries
    pub embedding_cache_capacity: usize,
    /// Content is truncated to this many characters
    pub max_content_chars: usize,
    /// Relationship set cap per memory
    pub max_relationships: usize,
    /// Hours between scheduled consolidation runs
    pub consolidation_interval_hours: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let retention_days = MemoryKind::ALL
            .into_iter()
            .map(|kind| (kind, default_retention_days(kind)))
            .collect();

        Self {
            retention_days,
            retention_importance_floor: 0.3,
            compute_importance: true,
            default_importance: 0.5,
            default_confidence: 0.8,
            default_origin: "user".to_string(),
            default_reliability: 0.7,
            dedup_threshold: 0.9,
            dedup_neighbors: 5,
            consolidation_threshold: 0.8,
            max_candidates: 50,
            max_results: 10,
            min_score: 0.1,
            embedding_model: None,
            embedding_dimensions: None,
            embedding_batch_size: 32,
            embedding_timeout_ms: 30_000,
            embedding_cache_capacity: 1024,
            max_content_chars: 10_000,
            max_relationships: 50,
            consolidation_interval_hours: 24,
        }
    }
}

fn default_retention_days(kind: MemoryKind) -> u32 {
    match kind {
        MemoryKind::Conversation => 30,
        MemoryKind::Observation | MemoryKind::Task => 90,
        MemoryKind::Experience => 180,
        MemoryKind::Fact | MemoryKind::Goal | MemoryKind::Knowledge => 365,
        MemoryKind::Preference | MemoryKind::Skill | MemoryKind::Relationship => 730,
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate().map_err(|e| match e {
            MemoryError::Validation(v) => ConfigError::Invalid(v),
            other => ConfigError::Invalid(vec![other.to_string()]),
        })?;
        Ok(config)
    }

    /// Apply `KEEPSAKE_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparsable values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
                    None
                }
            }
        }

        macro_rules! override_field {
            ($key:literal, $field:expr) => {
                if let Some(v) = parse($key, lookup($key)) {
                    $field = v;
                }
            };
        }

        override_field!("KEEPSAKE_DEDUP_THRESHOLD", self.dedup_threshold);
        override_field!("KEEPSAKE_CONSOLIDATION_THRESHOLD", self.consolidation_threshold);
        override_field!("KEEPSAKE_MAX_CANDIDATES", self.max_candidates);
        override_field!("KEEPSAKE_MAX_RESULTS", self.max_results);
        override_field!("KEEPSAKE_MIN_SCORE", self.min_score);
        override_field!("KEEPSAKE_EMBEDDING_TIMEOUT_MS", self.embedding_timeout_ms);
        override_field!("KEEPSAKE_EMBEDDING_BATCH_SIZE", self.embedding_batch_size);
        override_field!("KEEPSAKE_EMBEDDING_CACHE_CAPACITY", self.embedding_cache_capacity);
        override_field!("KEEPSAKE_MAX_CONTENT_CHARS", self.max_content_chars);
        override_field!("KEEPSAKE_MAX_RELATIONSHIPS", self.max_relationships);
        override_field!(
            "KEEPSAKE_CONSOLIDATION_INTERVAL_HOURS",
            self.consolidation_interval_hours
        );
        override_field!(
            "KEEPSAKE_RETENTION_IMPORTANCE_FLOOR",
            self.retention_importance_floor
        );
    }

    /// Check ranges; every violation is reported
    pub fn validate(&self) -> Result<(), MemoryError> {
        let mut errors = Vec::new();

        let unit = [
            ("retentionImportanceFloor", self.retention_importance_floor),
            ("defaultImportance", self.default_importance),
            ("defaultConfidence", self.default_confidence),
            ("defaultReliability", self.default_reliability),
            ("minScore", self.min_score),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{} must be within [0, 1], got {}", name, value));
            }
        }

        let thresholds = [
            ("dedupThreshold", self.dedup_threshold),
            ("consolidationThreshold", self.consolidation_threshold),
        ];
        for (name, value) in thresholds {
            if !(value > 0.0 && value <= 1.0) {
                errors.push(format!("{} must be within (0, 1], got {}", name, value));
            }
        }

        let counts = [
            ("maxCandidates", self.max_candidates),
            ("maxResults", self.max_results),
            ("embeddingBatchSize", self.embedding_batch_size),
            ("embeddingCacheCapacity", self.embedding_cache_capacity),
            ("maxContentChars", self.max_content_chars),
        ];
        for (name, value) in counts {
            if value == 0 {
                errors.push(format!("{} must be positive", name));
            }
        }

        if self.embedding_timeout_ms == 0 {
            errors.push("embeddingTimeoutMs must be positive".to_string());
        }
        if self.embedding_dimensions == Some(0) {
            errors.push("embeddingDimensions must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MemoryError::Validation(errors))
        }
    }

    /// Retention period for a kind
    pub fn retention_for(&self, kind: MemoryKind) -> chrono::Duration {
        let days = self
            .retention_days
            .get(&kind)
            .copied()
            .unwrap_or_else(|| default_retention_days(kind));
        chrono::Duration::days(i64::from(days))
    }

    /// Provider call timeout
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    /// Interval between scheduled consolidation runs
    pub fn consolidation_interval(&self) -> Duration {
        Duration::from_secs(self.consolidation_interval_hours.saturating_mul(3600))
    }
}
