//! Memory engine facade
//!
//! Wires the embedder, vector index, persistent store, episodic layer and
//! consolidation into one handle. Construction checks that the provider
//! matches the configured model and dimension, then loads the index from
//! the persistent store.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::consolidation::{ConsolidationEngine, ConsolidationScheduler};
use crate::embeddings::{Embedder, EmbeddingProvider, HashingEmbedder};
use crate::episodic::{EpisodicStore, extract_patterns};
use crate::error::{MemoryError, Result};
use crate::long_term::LongTermStore;
use crate::memory::{
    ConflictResolution, ConsolidationReport, EpisodeDraft, EpisodicMemory, MemoryCandidate,
    MemoryItem, MemoryPatch, MemoryStats, Pattern, RepairReport, RetrievalQuery, RetrievalResult,
};
use crate::search::{RebuildStats, VectorIndex};
use crate::storage::{InMemoryStore, MemoryFilter, PersistentStore};

/// Persistent memory for a conversational agent
pub struct MemoryEngine {
    config: Arc<EngineConfig>,
    long_term: Arc<LongTermStore>,
    episodic: EpisodicStore,
    consolidation: Arc<ConsolidationEngine>,
}

impl MemoryEngine {
    /// Build an engine over injected collaborators.
    ///
    /// Fails with `Validation` for a bad configuration, and with
    /// `DimensionMismatch` / `ModelMismatch` when the provider disagrees with
    /// the configured embedding model.
    pub async fn new(
        config: EngineConfig,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Self> {
        config.validate()?;

        let dimensions = provider.dimensions();
        if dimensions == 0 {
            return Err(MemoryError::invalid("embedding provider reports zero dimensions"));
        }
        if let Some(expected) = config.embedding_dimensions {
            if expected != dimensions {
                return Err(MemoryError::DimensionMismatch {
                    expected,
                    got: dimensions,
                });
            }
        }
        if let Some(expected) = &config.embedding_model {
            if expected != provider.model_name() {
                return Err(MemoryError::ModelMismatch {
                    expected: expected.clone(),
                    got: provider.model_name().to_string(),
                });
            }
        }

        let config = Arc::new(config);
        let embedder = Arc::new(Embedder::new(Arc::clone(&provider), &config));
        let index = VectorIndex::new(provider.model_name(), dimensions);
        let long_term = Arc::new(LongTermStore::new(
            Arc::clone(&config),
            embedder,
            index,
            store,
        ));
        let rebuilt = long_term.rebuild_index().await?;

        tracing::info!(
            model = provider.model_name(),
            dimensions,
            indexed = rebuilt.indexed,
            "Memory engine ready"
        );

        Ok(Self {
            episodic: EpisodicStore::new(Arc::clone(&long_term)),
            consolidation: Arc::new(ConsolidationEngine::new(Arc::clone(&long_term))),
            config,
            long_term,
        })
    }

    /// Engine with the hashing embedder and an in-memory store
    pub async fn in_memory(config: EngineConfig) -> Result<Self> {
        let dimensions = config
            .embedding_dimensions
            .unwrap_or(crate::embeddings::DEFAULT_HASHING_DIMENSIONS);
        Self::new(
            config,
            Arc::new(HashingEmbedder::new(dimensions)),
            Arc::new(InMemoryStore::new()),
        )
        .await
    }

    /// Configuration in effect
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Long-term store
    pub fn long_term(&self) -> &Arc<LongTermStore> {
        &self.long_term
    }

    /// Episodic layer
    pub fn episodic(&self) -> &EpisodicStore {
        &self.episodic
    }

    // ========================================================================
    // LONG-TERM
    // ========================================================================

    /// Store a memory (near-duplicates are merged); returns the id
    pub async fn store(&self, candidate: MemoryCandidate) -> Result<String> {
        self.long_term.store(candidate).await
    }

    /// Ranked retrieval
    pub async fn retrieve(&self, query: RetrievalQuery) -> Result<Vec<RetrievalResult>> {
        self.long_term.retrieve(query).await
    }

    /// Fetch a memory without touching it
    pub async fn get(&self, id: &str) -> Result<MemoryItem> {
        self.long_term.get(id).await
    }

    /// Filtered listing
    pub async fn list(&self, filter: &MemoryFilter) -> Result<Vec<MemoryItem>> {
        self.long_term.list(filter).await
    }

    /// Partial update
    pub async fn update(&self, id: &str, patch: MemoryPatch) -> Result<MemoryItem> {
        self.long_term.update(id, patch).await
    }

    /// Delete a memory and every reference to it
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.long_term.delete(id).await
    }

    /// Weaken memories contradicted by a better-supported one
    pub async fn resolve_conflicts(&self, id: &str) -> Result<ConflictResolution> {
        self.long_term.resolve_conflicts(id).await
    }

    // ========================================================================
    // EPISODIC
    // ========================================================================

    /// Record an episode with derived lessons
    pub async fn record_episode(&self, draft: EpisodeDraft) -> Result<String> {
        self.episodic.record_episode(draft).await
    }

    /// Episodes resembling a description
    pub async fn find_similar_experiences(&self, description: &str) -> Result<Vec<EpisodicMemory>> {
        self.episodic.find_similar_experiences(description).await
    }

    /// Free-text prediction from similar episodes
    pub async fn predict_outcome(&self, scenario: &str) -> Result<String> {
        self.episodic.predict_outcome(scenario).await
    }

    /// Patterns in a given set of episodes
    pub fn extract_patterns(&self, episodes: &[EpisodicMemory]) -> Vec<Pattern> {
        extract_patterns(episodes)
    }

    /// Patterns across every stored episode
    pub async fn mine_patterns(&self) -> Result<Vec<Pattern>> {
        self.episodic.mine_patterns().await
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Consolidate at the configured threshold
    pub async fn consolidate(&self) -> Result<ConsolidationReport> {
        self.consolidate_with_threshold(self.config.consolidation_threshold)
            .await
    }

    /// Consolidate at an explicit threshold
    pub async fn consolidate_with_threshold(&self, threshold: f64) -> Result<ConsolidationReport> {
        self.consolidation.consolidate(threshold, None).await
    }

    /// Reload the vector index from the persistent store
    pub async fn rebuild_index(&self) -> Result<RebuildStats> {
        self.long_term.rebuild_index().await
    }

    /// Embed memories that have no persisted vector
    pub async fn repair_embeddings(&self) -> Result<RepairReport> {
        self.long_term.repair_embeddings().await
    }

    /// Delete expired low-importance memories
    pub async fn prune_expired(&self, at: DateTime<Utc>) -> Result<Vec<String>> {
        self.long_term.prune_expired(at).await
    }

    /// Aggregate statistics
    pub async fn stats(&self) -> Result<MemoryStats> {
        self.long_term.stats().await
    }

    /// Periodic maintenance at the configured interval; call `spawn` to start it
    pub fn scheduler(&self) -> ConsolidationScheduler {
        ConsolidationScheduler::new(
            Arc::clone(&self.consolidation),
            self.config.consolidation_interval(),
        )
    }
}
