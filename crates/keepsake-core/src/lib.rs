//! # Keepsake Core
//!
//! Persistent memory engine for conversational agents:
//!
//! - **Long-Term Memory**: Typed memories with scope, provenance and analysis metadata
//! - **Semantic Retrieval**: Importance, cosine similarity, keyword overlap and recency blended into one score
//! - **Write-Time Deduplication**: Near-duplicates fold into the existing memory
//! - **Episodic Memory**: Events with outcomes, derived lessons, outcome prediction and pattern mining
//! - **Consolidation**: Greedy clustering of near-duplicates into richer representatives
//! - **Retention**: Per-kind retention periods with an importance floor
//!
//! ## Collaborators
//!
//! The engine is assembled from injected parts, with no global state:
//!
//! - [`EmbeddingProvider`]: text to fixed-dimension vectors. [`HashingEmbedder`]
//!   is always available; `LocalEmbedder` (fastembed) sits behind the
//!   `local-embeddings` feature.
//! - [`PersistentStore`]: the source of truth. [`SqliteStore`] for disk,
//!   [`InMemoryStore`] for tests and ephemeral agents.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use keepsake_core::prelude::*;
//!
//! let engine = MemoryEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(HashingEmbedder::default()),
//!     Arc::new(SqliteStore::open(None)?),
//! )
//! .await?;
//!
//! let id = engine
//!     .store(MemoryCandidate::new("Alice prefers dark mode", MemoryKind::Preference))
//!     .await?;
//!
//! let results = engine.retrieve(RetrievalQuery::new("dark mode preference")).await?;
//! assert_eq!(results[0].item.id, id);
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): Bundled SQLite
//! - `encryption`: SQLCipher, keyed by `KEEPSAKE_ENCRYPTION_KEY`
//! - `local-embeddings`: Local ONNX embeddings with fastembed (nomic-embed-text-v1.5)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod consolidation;
pub mod embeddings;
pub mod engine;
pub mod episodic;
pub mod error;
pub mod locks;
pub mod long_term;
pub mod memory;
pub mod search;
pub mod storage;

#[cfg(test)]
mod testing;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::{ConfigError, EngineConfig};
pub use consolidation::{ConsolidationEngine, ConsolidationScheduler, SchedulerHandle};
pub use embeddings::{
    CacheStats, DEFAULT_HASHING_DIMENSIONS, Embedder, EmbeddingCache, EmbeddingError,
    EmbeddingProvider, HashingEmbedder, cosine_similarity,
};
#[cfg(feature = "local-embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "local-embeddings")))]
pub use embeddings::{EMBEDDING_DIMENSIONS, LocalEmbedder};
pub use engine::MemoryEngine;
pub use episodic::{EpisodicStore, derive_lessons, extract_patterns};
pub use error::{MemoryError, Result};
pub use long_term::{LongTermStore, WriteMode};
pub use memory::{
    ConflictResolution, ConsolidationReport, EpisodeDetails, EpisodeDraft, EpisodicMemory,
    KindDetails, MaintenanceReport, MemoryCandidate, MemoryContext, MemoryItem, MemoryKind,
    MemoryMetadata, MemoryPatch, MemorySource, MemoryStats, MergeRecord, Pattern, RepairReport,
    RetrievalQuery, RetrievalResult, StoredVector, TimeRange,
};
pub use search::{RebuildStats, VectorIndex, VectorIndexStats};
pub use storage::{
    InMemoryStore, MemoryFilter, PersistentStore, SortOrder, SqliteStore, StorageError,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default local embedding model (feature `local-embeddings`)
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-ai/nomic-embed-text-v1.5";

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        EngineConfig, EpisodeDraft, HashingEmbedder, InMemoryStore, MemoryCandidate,
        MemoryContext, MemoryEngine, MemoryError, MemoryKind, MemoryPatch, Result,
        RetrievalQuery, SqliteStore,
    };

    #[cfg(feature = "local-embeddings")]
    pub use crate::LocalEmbedder;
}
