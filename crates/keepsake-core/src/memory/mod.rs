//! Memory Module
//!
//! Core data model:
//! - `MemoryItem` with its context, source and metadata
//! - Episodes and mined patterns
//! - Result types shared by the stores and the engine

mod episode;
mod item;

pub use episode::{EpisodeDetails, EpisodeDraft, EpisodicMemory, Pattern};
pub(crate) use item::{dedup_ordered, push_unique};
pub use item::{
    KindDetails, MemoryCandidate, MemoryContext, MemoryItem, MemoryKind, MemoryMetadata,
    MemoryPatch, MemorySource, RetrievalQuery, StoredVector, TimeRange, now,
};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embeddings::CacheStats;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// A ranked retrieval hit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    /// The memory, as touched by this retrieval
    pub item: MemoryItem,
    /// Combined relevance score
    pub score: f64,
    /// Cosine similarity to the query, clamped to 0.0 - 1.0
    pub similarity: f64,
}

/// One applied merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRecord {
    /// Surviving memory
    pub representative: String,
    /// Memories folded into it and deleted
    pub absorbed: Vec<String>,
    /// Members that no longer existed when the merge ran
    pub stale: Vec<String>,
}

/// Result of a consolidation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationReport {
    /// Similarity threshold used
    pub threshold: f64,
    /// Memories before the run
    pub memories_before: usize,
    /// Memories after the run
    pub memories_after: usize,
    /// Clusters with more than one member
    pub clusters_found: usize,
    /// Memories absorbed and deleted
    pub memories_merged: usize,
    /// Cluster members skipped because they vanished mid-run
    pub stale_skipped: usize,
    /// Per-cluster merges
    pub merges: Vec<MergeRecord>,
    /// When the run finished
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall time in milliseconds
    pub duration_ms: i64,
}

/// Result of a conflict resolution pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    /// Memory whose contradictions were resolved
    pub subject: String,
    /// Contradicting memories that lost and were weakened
    pub weakened: Vec<String>,
    /// Contradicting memories that held their ground
    pub unchanged: Vec<String>,
    /// Contradiction ids that no longer exist
    pub missing: Vec<String>,
}

/// Result of re-embedding memories that had no vector
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    /// Memories that now have a vector
    pub repaired: Vec<String>,
    /// Memories that still have none
    pub failed: Vec<String>,
}

/// Result of a scheduled maintenance pass
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    /// Consolidation outcome
    pub consolidation: ConsolidationReport,
    /// Ids removed by retention
    pub pruned: Vec<String>,
}

/// Engine statistics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Total stored memories
    pub total_memories: usize,
    /// Count per kind
    pub by_kind: BTreeMap<MemoryKind, usize>,
    /// Episodes among the memories
    pub episodes: usize,
    /// Memories with a persisted vector
    pub with_vectors: usize,
    /// Entries in the in-memory vector index
    pub indexed: usize,
    /// Mean importance
    pub average_importance: f64,
    /// Oldest creation time
    pub oldest_memory: Option<DateTime<Utc>>,
    /// Newest creation time
    pub newest_memory: Option<DateTime<Utc>>,
    /// Last recorded consolidation
    pub last_consolidation: Option<DateTime<Utc>>,
    /// Embedding model in use
    pub embedding_model: String,
    /// Embedding cache counters
    pub cache: CacheStats,
}

impl MemoryStats {
    /// Share of memories with a persisted vector, 0.0 - 1.0
    pub fn vector_coverage(&self) -> f64 {
        if self.total_memories == 0 {
            1.0
        } else {
            self.with_vectors as f64 / self.total_memories as f64
        }
    }
}
