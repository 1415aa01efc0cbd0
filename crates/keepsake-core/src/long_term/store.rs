//! Long-term memory store
//!
//! Write path: validate, sanitize, embed, deduplicate against the vector
//! index, enrich, persist record and vector together, then link peers.
//! Read path: filter in the persistent store, score candidates against a
//! snapshot of their vectors, touch the winners.
//!
//! The persistent store is the source of truth. The index is derived from
//! it and only updated after a successful write.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use super::scoring::{ImportanceSignals, retrieval_score};
use super::sentiment;
use crate::config::EngineConfig;
use crate::embeddings::{Embedder, cosine_similarity};
use crate::error::{MemoryError, Result};
use crate::locks::KeyedLocks;
use crate::memory::{
    ConflictResolution, KindDetails, MemoryCandidate, MemoryItem, MemoryKind, MemoryMetadata,
    MemoryPatch, MemorySource, MemoryStats, MergeRecord, RepairReport, RetrievalQuery,
    RetrievalResult, StoredVector, dedup_ordered, now, push_unique,
};
use crate::search::keywords::{
    extract_entities, extract_keywords, extract_topics, keyword_overlap, tokenize,
};
use crate::search::{RebuildStats, VectorIndex, VectorIndexStats};
use crate::storage::{MemoryFilter, PersistentStore, SortOrder, StorageError};

/// Keywords kept in metadata and used for default tags
const MAX_KEYWORDS: usize = 5;

/// Keywords taken from a retrieval query
const MAX_QUERY_KEYWORDS: usize = 10;

/// Confidence multiplier applied to the losing side of a contradiction
const CONFLICT_PENALTY: f64 = 0.8;

/// How a write treats near-duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Fold the candidate into an existing memory at or above the dedup threshold
    #[default]
    Deduplicate,
    /// Always create a new record (episodes are distinct events)
    AlwaysInsert,
}

/// Validated and sanitized store input
struct Prepared {
    content: String,
    kind: MemoryKind,
    context: crate::memory::MemoryContext,
    importance: Option<f64>,
    confidence: Option<f64>,
    tags: Option<Vec<String>>,
    relationships: Vec<String>,
    source: Option<MemorySource>,
    metadata: Option<MemoryMetadata>,
}

/// Strip control characters (newline and tab survive), trim, and cap length
/// on a char boundary
pub fn sanitize_content(raw: &str, max_chars: usize) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    cleaned.trim().chars().take(max_chars).collect()
}

fn check_unit(name: &str, value: Option<f64>, violations: &mut Vec<String>) {
    if let Some(v) = value {
        if !v.is_finite() || !(0.0..=1.0).contains(&v) {
            violations.push(format!("{} must be between 0.0 and 1.0 (got {})", name, v));
        }
    }
}

fn check_source(source: Option<&MemorySource>, violations: &mut Vec<String>) {
    if let Some(source) = source {
        if source.origin.trim().is_empty() {
            violations.push("source origin must not be empty".to_string());
        }
        check_unit("source reliability", Some(source.reliability), violations);
    }
}

/// Kind name followed by the top keywords
fn default_tags(kind: MemoryKind, keywords: &[String]) -> Vec<String> {
    let mut tags = vec![kind.as_str().to_string()];
    for keyword in keywords {
        push_unique(&mut tags, keyword);
    }
    tags
}

/// Per-kind details when the caller supplied none
fn default_details(kind: MemoryKind, metadata: &MemoryMetadata, content: &str) -> KindDetails {
    match kind {
        MemoryKind::Preference => KindDetails::Preference {
            subject: if metadata.keywords.is_empty() {
                content.to_string()
            } else {
                metadata.keywords.join(" ")
            },
            positive: metadata.sentiment >= 0.0,
        },
        MemoryKind::Goal => KindDetails::Goal {
            deadline: None,
            progress: 0.0,
        },
        MemoryKind::Task => KindDetails::Task {
            due: None,
            completed: false,
        },
        MemoryKind::Skill => KindDetails::Skill { proficiency: 0.5 },
        MemoryKind::Relationship => KindDetails::Relationship {
            entity: metadata.entities.first().cloned().unwrap_or_default(),
            relation: "known".to_string(),
        },
        _ => KindDetails::General,
    }
}

/// Fill the analysis fields the caller left empty
fn analyze_into(metadata: &mut MemoryMetadata, content: &str, kind: MemoryKind) {
    if metadata.keywords.is_empty() {
        metadata.keywords = extract_keywords(content, MAX_KEYWORDS);
    }
    if metadata.entities.is_empty() {
        metadata.entities = extract_entities(content);
    }
    if metadata.topics.is_empty() {
        metadata.topics = extract_topics(content);
    }
    if metadata.sentiment == 0.0 {
        metadata.sentiment = sentiment::analyze(content);
    }
    if metadata.details == KindDetails::General {
        metadata.details = default_details(kind, metadata, content);
    }
}

/// Recompute every analysis field after a content change
fn reanalyze(metadata: &mut MemoryMetadata, content: &str) {
    metadata.keywords = extract_keywords(content, MAX_KEYWORDS);
    metadata.entities = extract_entities(content);
    metadata.topics = extract_topics(content);
    metadata.sentiment = sentiment::analyze(content);
}

/// Replace or drop `old` in a reference list; returns whether it changed
fn repoint(list: &mut Vec<String>, old: &str, replacement: Option<&str>, owner: &str) -> bool {
    let before = list.len();
    list.retain(|id| id != old);
    if list.len() == before {
        return false;
    }
    if let Some(new_id) = replacement {
        if new_id != owner {
            push_unique(list, new_id);
        }
    }
    true
}

/// Durable memory store with semantic retrieval
pub struct LongTermStore {
    config: Arc<EngineConfig>,
    embedder: Arc<Embedder>,
    index: RwLock<VectorIndex>,
    store: Arc<dyn PersistentStore>,
    locks: KeyedLocks,
}

impl LongTermStore {
    /// Assemble a store from its collaborators.
    ///
    /// The index is used as given; call [`LongTermStore::rebuild_index`] to
    /// load it from the persistent store.
    pub fn new(
        config: Arc<EngineConfig>,
        embedder: Arc<Embedder>,
        index: VectorIndex,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        Self {
            config,
            embedder,
            index: RwLock::new(index),
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Embedder in use
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Backing persistent store
    pub fn persistent(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    /// Read access to the vector index (never held across an await)
    pub(crate) fn with_index<T>(&self, f: impl FnOnce(&VectorIndex) -> T) -> Result<T> {
        let index = self
            .index
            .read()
            .map_err(|_| MemoryError::Internal("Vector index lock poisoned".into()))?;
        Ok(f(&index))
    }

    fn with_index_mut<T>(&self, f: impl FnOnce(&mut VectorIndex) -> T) -> Result<T> {
        let mut index = self
            .index
            .write()
            .map_err(|_| MemoryError::Internal("Vector index lock poisoned".into()))?;
        Ok(f(&mut index))
    }

    /// Vector index statistics
    pub fn index_stats(&self) -> Result<VectorIndexStats> {
        self.with_index(VectorIndex::stats)
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Store a memory, folding it into a near-duplicate when one exists.
    ///
    /// Returns the id of the new memory, or of the memory it was merged into.
    pub async fn store(&self, candidate: MemoryCandidate) -> Result<String> {
        self.store_with(candidate, WriteMode::Deduplicate).await
    }

    /// Store a memory with an explicit dedup mode
    pub async fn store_with(&self, candidate: MemoryCandidate, mode: WriteMode) -> Result<String> {
        let prepared = self.prepare(candidate)?;
        let vector = self.embedder.embed(&prepared.content).await?;

        let neighbours = self.with_index(|index| {
            index.query(&vector, f32::MIN, self.config.dedup_neighbors)
        })??;
        let top_similarity = neighbours.first().map(|(_, s)| f64::from(*s)).unwrap_or(0.0);

        if mode == WriteMode::Deduplicate {
            for (target, similarity) in &neighbours {
                if f64::from(*similarity) < self.config.dedup_threshold {
                    break;
                }
                if let Some(id) = self.absorb(target, &prepared).await? {
                    tracing::debug!(into = %id, similarity, "Merged candidate into existing memory");
                    return Ok(id);
                }
            }
        }

        self.create(prepared, vector, top_similarity).await
    }

    fn prepare(&self, candidate: MemoryCandidate) -> Result<Prepared> {
        let mut violations = Vec::new();

        let content = sanitize_content(&candidate.content, self.config.max_content_chars);
        if content.is_empty() {
            violations.push("content must not be empty".to_string());
        }
        if candidate.kind.is_none() {
            violations.push("kind is required".to_string());
        }
        if candidate.context.is_none() {
            violations.push("context is required".to_string());
        }
        check_unit("importance", candidate.importance, &mut violations);
        check_unit("confidence", candidate.confidence, &mut violations);
        check_source(candidate.source.as_ref(), &mut violations);

        match (candidate.kind, candidate.context) {
            (Some(kind), Some(context)) if violations.is_empty() => Ok(Prepared {
                content,
                kind,
                context,
                importance: candidate.importance,
                confidence: candidate.confidence,
                tags: candidate.tags,
                relationships: candidate.relationships,
                source: candidate.source,
                metadata: candidate.metadata,
            }),
            _ => Err(MemoryError::Validation(violations)),
        }
    }

    /// Ids among `ids` that exist, deduplicated, without `exclude`, capped
    async fn existing_ids(&self, ids: &[String], exclude: Option<&str>) -> Result<Vec<String>> {
        let mut kept = Vec::new();
        for id in dedup_ordered(ids.to_vec()) {
            if Some(id.as_str()) == exclude {
                continue;
            }
            if kept.len() >= self.config.max_relationships {
                tracing::debug!(id = %id, "Relationship cap reached, dropping reference");
                continue;
            }
            if self.store.get(&id).await?.is_some() {
                kept.push(id);
            } else {
                tracing::debug!(id = %id, "Dropping reference to unknown memory");
            }
        }
        Ok(kept)
    }

    /// Fold a candidate into `target_id`; `None` when the target is gone, is
    /// an episode, or belongs to another scope
    async fn absorb(&self, target_id: &str, prepared: &Prepared) -> Result<Option<String>> {
        let guard = self.locks.lock(target_id).await;
        let Some(mut target) = self.store.get(target_id).await? else {
            return Ok(None);
        };
        if target.is_episode() || !target.context.same_scope(&prepared.context) {
            return Ok(None);
        }
        if target.kind != prepared.kind {
            tracing::debug!(
                into = %target.id,
                target_kind = %target.kind,
                candidate_kind = %prepared.kind,
                "Merging candidate of a different kind; target keeps its kind"
            );
        }

        let tags = match &prepared.tags {
            Some(tags) => tags.clone(),
            None => default_tags(
                prepared.kind,
                &extract_keywords(&prepared.content, MAX_KEYWORDS),
            ),
        };
        for tag in &tags {
            push_unique(&mut target.tags, tag);
        }
        if let Some(importance) = prepared.importance {
            target.importance = target.importance.max(importance);
        }
        if let Some(confidence) = prepared.confidence {
            target.confidence = target.confidence.max(confidence);
        }

        let mut added = Vec::new();
        for id in self.existing_ids(&prepared.relationships, Some(&target.id)).await? {
            if target.relationships.len() >= self.config.max_relationships {
                break;
            }
            if push_unique(&mut target.relationships, &id) {
                added.push(id);
            }
        }

        if prepared.content != target.content {
            push_unique(&mut target.metadata.merged_variants, &prepared.content);
        }
        target.last_accessed = now();

        self.store.save(&target, None).await?;
        drop(guard);

        self.link_peers(&target.id, &added).await;
        Ok(Some(target.id))
    }

    async fn create(&self, prepared: Prepared, vector: Vec<f32>, top_similarity: f64) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let created_at = now();

        let source = prepared.source.unwrap_or_else(|| {
            MemorySource::new(
                self.config.default_origin.clone(),
                self.config.default_reliability,
            )
        });

        let mut metadata = prepared.metadata.unwrap_or_default();
        analyze_into(&mut metadata, &prepared.content, prepared.kind);

        let importance = match prepared.importance {
            Some(importance) => importance,
            None if self.config.compute_importance => ImportanceSignals {
                age_days: (created_at - prepared.context.timestamp).num_seconds().max(0) as f64
                    / 86_400.0,
                access_count: 0,
                top_similarity,
                sentiment: metadata.sentiment,
                reliability: source.reliability,
            }
            .score(),
            None => self.config.default_importance,
        };

        let tags = match prepared.tags {
            Some(tags) => dedup_ordered(tags),
            None => default_tags(prepared.kind, &metadata.keywords),
        };
        let relationships = self.existing_ids(&prepared.relationships, None).await?;

        let item = MemoryItem {
            id: id.clone(),
            kind: prepared.kind,
            content: prepared.content,
            context: prepared.context,
            importance,
            confidence: prepared.confidence.unwrap_or(self.config.default_confidence),
            tags,
            relationships,
            created_at,
            last_accessed: created_at,
            access_count: 0,
            source,
            metadata,
        };

        let stored = StoredVector::new(&id, self.embedder.model_name(), vector.clone());
        self.store.insert(&item, &stored).await?;
        self.with_index_mut(|index| index.upsert(&id, vector))??;

        tracing::debug!(id = %id, kind = %item.kind, importance, "Stored memory");

        self.link_peers(&id, &item.relationships).await;
        Ok(id)
    }

    /// Add `id` to each peer's relationships; failures are logged only
    async fn link_peers(&self, id: &str, peers: &[String]) {
        for peer in peers {
            if let Err(e) = self.link_one(peer, id).await {
                tracing::warn!(peer = %peer, id = %id, error = %e, "Failed to link related memory");
            }
        }
    }

    async fn link_one(&self, peer_id: &str, id: &str) -> Result<()> {
        let _guard = self.locks.lock(peer_id).await;
        let Some(mut peer) = self.store.get(peer_id).await? else {
            return Ok(());
        };
        if peer.relationships.len() >= self.config.max_relationships {
            tracing::debug!(peer = %peer_id, "Peer relationship cap reached");
            return Ok(());
        }
        if push_unique(&mut peer.relationships, id) {
            self.save_ignoring_vanished(&peer).await?;
        }
        Ok(())
    }

    /// Add one-directional relationships from `id` to existing `targets`;
    /// returns the ids actually added
    pub async fn add_relationships(&self, id: &str, targets: &[String]) -> Result<Vec<String>> {
        let targets = self.existing_ids(targets, Some(id)).await?;

        let _guard = self.locks.lock(id).await;
        let mut item = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

        let mut added = Vec::new();
        for target in targets {
            if item.relationships.len() >= self.config.max_relationships {
                break;
            }
            if push_unique(&mut item.relationships, &target) {
                added.push(target);
            }
        }
        if !added.is_empty() {
            self.store.save(&item, None).await?;
        }
        Ok(added)
    }

    /// Save, treating a concurrently deleted record as a no-op
    async fn save_ignoring_vanished(&self, item: &MemoryItem) -> Result<bool> {
        match self.store.save(item, None).await {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Rank stored memories against a query and touch the returned ones
    pub async fn retrieve(&self, query: RetrievalQuery) -> Result<Vec<RetrievalResult>> {
        if query.text.trim().is_empty() {
            return Err(MemoryError::invalid("query text must not be empty"));
        }
        let mut violations = Vec::new();
        check_unit("min importance", query.min_importance, &mut violations);
        if !violations.is_empty() {
            return Err(MemoryError::Validation(violations));
        }

        let limit = query.limit.unwrap_or(self.config.max_results);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let deadline = query.timeout.map(|t| Instant::now() + t);
        let check_deadline = || match deadline {
            Some(d) if Instant::now() >= d => Err(MemoryError::Cancelled(
                "retrieval deadline elapsed".into(),
            )),
            _ => Ok(()),
        };

        let query_vector = match deadline {
            Some(d) => tokio::time::timeout_at(d, self.embedder.embed(&query.text))
                .await
                .map_err(|_| MemoryError::Cancelled("retrieval deadline elapsed".into()))??,
            None => self.embedder.embed(&query.text).await?,
        };

        let filter = MemoryFilter {
            kinds: query.kinds.clone(),
            min_importance: query.min_importance,
            created: query.time_range,
            user_id: query.user_id.clone(),
            conversation_id: query.conversation_id.clone(),
            workspace_id: query.workspace_id.clone(),
            sort: SortOrder::ImportanceDesc,
            limit: Some(self.config.max_candidates),
            ..MemoryFilter::default()
        };
        let candidates = self.store.list(&filter).await?;
        check_deadline()?;

        let vectors: HashMap<String, Vec<f32>> = self.with_index(|index| {
            candidates
                .iter()
                .filter_map(|c| index.get(&c.id).map(|v| (c.id.clone(), v.to_vec())))
                .collect()
        })?;

        let query_keywords = extract_keywords(&query.text, MAX_QUERY_KEYWORDS);
        let scored_at = now();
        let mut scored = Vec::new();

        for item in candidates {
            check_deadline()?;
            let similarity = vectors
                .get(&item.id)
                .map(|v| f64::from(cosine_similarity(&query_vector, v)).max(0.0))
                .unwrap_or(0.0);

            let mut haystack = tokenize(&item.content);
            haystack.extend(item.tags.iter().flat_map(|t| tokenize(t)));
            haystack.extend(item.metadata.keywords.iter().cloned());
            let keyword_match = keyword_overlap(&query_keywords, &haystack);

            let score = retrieval_score(
                item.importance,
                similarity,
                keyword_match,
                item.age_days(scored_at),
            );
            if score > self.config.min_score {
                scored.push(RetrievalResult {
                    item,
                    score,
                    similarity,
                });
            }
        }

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.item.last_accessed.cmp(&a.item.last_accessed))
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        scored.truncate(limit);

        let mut results = Vec::with_capacity(scored.len());
        for hit in scored {
            if let Some(item) = self.touch(&hit.item.id).await? {
                results.push(RetrievalResult { item, ..hit });
            }
        }

        tracing::debug!(query = %query.text, results = results.len(), "Retrieval complete");
        Ok(results)
    }

    /// Record an access; `None` if the memory was deleted meanwhile
    async fn touch(&self, id: &str) -> Result<Option<MemoryItem>> {
        let _guard = self.locks.lock(id).await;
        let Some(mut item) = self.store.get(id).await? else {
            return Ok(None);
        };
        item.access_count = item.access_count.saturating_add(1);
        item.last_accessed = now();
        if self.save_ignoring_vanished(&item).await? {
            Ok(Some(item))
        } else {
            Ok(None)
        }
    }

    /// Fetch a memory without touching it
    pub async fn get(&self, id: &str) -> Result<MemoryItem> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
    }

    /// Filtered listing straight from the persistent store
    pub async fn list(&self, filter: &MemoryFilter) -> Result<Vec<MemoryItem>> {
        Ok(self.store.list(filter).await?)
    }

    // ========================================================================
    // UPDATE / DELETE
    // ========================================================================

    /// Apply a partial update; a content change is re-embedded before the write
    pub async fn update(&self, id: &str, patch: MemoryPatch) -> Result<MemoryItem> {
        let mut violations = Vec::new();
        let content = patch
            .content
            .as_deref()
            .map(|c| sanitize_content(c, self.config.max_content_chars));
        if content.as_deref() == Some("") {
            violations.push("content must not be empty".to_string());
        }
        check_unit("importance", patch.importance, &mut violations);
        check_unit("confidence", patch.confidence, &mut violations);
        check_source(patch.source.as_ref(), &mut violations);
        if !violations.is_empty() {
            return Err(MemoryError::Validation(violations));
        }

        let vector = match &content {
            Some(content) => Some(self.embedder.embed(content).await?),
            None => None,
        };
        let relationships = match &patch.relationships {
            Some(ids) => Some(self.existing_ids(ids, Some(id)).await?),
            None => None,
        };

        let guard = self.locks.lock(id).await;
        let mut item = self.get(id).await?;
        let previous_relationships = item.relationships.clone();

        if let Some(metadata) = patch.metadata {
            item.metadata = metadata;
        }
        if let Some(content) = content {
            reanalyze(&mut item.metadata, &content);
            item.content = content;
        }
        if let Some(importance) = patch.importance {
            item.importance = importance;
        }
        if let Some(confidence) = patch.confidence {
            item.confidence = confidence;
        }
        if let Some(tags) = patch.tags {
            item.tags = dedup_ordered(tags);
        }
        if let Some(relationships) = relationships {
            item.relationships = relationships;
        }
        if let Some(contradicts) = patch.contradicts {
            item.metadata.contradicts = dedup_ordered(contradicts);
            item.metadata.contradicts.retain(|c| c != id);
        }
        if let Some(source) = patch.source {
            item.source = source;
        }
        item.last_accessed = now();

        let stored = vector
            .as_ref()
            .map(|v| StoredVector::new(id, self.embedder.model_name(), v.clone()));
        self.store.save(&item, stored.as_ref()).await?;
        if let Some(vector) = vector {
            self.with_index_mut(|index| index.upsert(id, vector))??;
        }
        drop(guard);

        let added: Vec<String> = item
            .relationships
            .iter()
            .filter(|r| !previous_relationships.contains(r))
            .cloned()
            .collect();
        self.link_peers(id, &added).await;

        tracing::debug!(id = %id, "Updated memory");
        Ok(item)
    }

    /// Delete a memory and strip every reference to it
    pub async fn delete(&self, id: &str) -> Result<()> {
        {
            let _guard = self.locks.lock(id).await;
            if !self.store.delete(id).await? {
                return Err(MemoryError::NotFound(id.to_string()));
            }
            self.with_index_mut(|index| index.remove(id))?;
        }

        self.repoint_references(id, None).await?;
        tracing::debug!(id = %id, "Deleted memory");
        Ok(())
    }

    /// Rewrite every reference to `old` (relationships and contradictions):
    /// dropped, or replaced by `replacement`
    async fn repoint_references(&self, old: &str, replacement: Option<&str>) -> Result<()> {
        let peers = self.store.list(&MemoryFilter::referencing(old)).await?;
        for peer in peers {
            let _guard = self.locks.lock(&peer.id).await;
            let Some(mut current) = self.store.get(&peer.id).await? else {
                continue;
            };
            let owner = current.id.clone();
            let mut changed = repoint(&mut current.relationships, old, replacement, &owner);
            changed |= repoint(&mut current.metadata.contradicts, old, replacement, &owner);
            current.relationships.truncate(self.config.max_relationships);
            if changed {
                if let Err(e) = self.save_ignoring_vanished(&current).await {
                    tracing::warn!(peer = %owner, old = %old, error = %e, "Failed to rewrite reference");
                }
            }
        }
        Ok(())
    }

    /// Weaken memories that `id` contradicts when `id` is better supported.
    ///
    /// `id` wins against another memory when its confidence or its source
    /// reliability is strictly higher. Only the losers change.
    pub async fn resolve_conflicts(&self, id: &str) -> Result<ConflictResolution> {
        let subject = self.get(id).await?;
        let mut resolution = ConflictResolution {
            subject: id.to_string(),
            ..Default::default()
        };

        for other_id in dedup_ordered(subject.metadata.contradicts.clone()) {
            if other_id == id {
                continue;
            }
            let _guard = self.locks.lock(&other_id).await;
            let Some(mut other) = self.store.get(&other_id).await? else {
                resolution.missing.push(other_id);
                continue;
            };

            let wins = subject.confidence > other.confidence
                || subject.source.reliability > other.source.reliability;
            if wins {
                other.confidence *= CONFLICT_PENALTY;
                other.metadata.verified = false;
                if self.save_ignoring_vanished(&other).await? {
                    resolution.weakened.push(other_id);
                } else {
                    resolution.missing.push(other_id);
                }
            } else {
                resolution.unchanged.push(other_id);
            }
        }

        tracing::debug!(
            subject = %id,
            weakened = resolution.weakened.len(),
            "Resolved contradictions"
        );
        Ok(resolution)
    }

    // ========================================================================
    // CONSOLIDATION SUPPORT
    // ========================================================================

    /// Fold `members` into `target_id` and delete them.
    ///
    /// The representative keeps its content and vector; absorbed contents are
    /// recorded in `metadata.merged_variants`. Members that no longer exist are
    /// reported as stale. Returns `None` when the representative is gone.
    pub async fn merge(&self, target_id: &str, members: &[String]) -> Result<Option<MergeRecord>> {
        let members: Vec<String> = dedup_ordered(members.to_vec())
            .into_iter()
            .filter(|m| m != target_id)
            .collect();
        let mut lock_ids = members.clone();
        lock_ids.push(target_id.to_string());

        let guards = self.locks.lock_many(&lock_ids).await;
        let Some(mut representative) = self.store.get(target_id).await? else {
            return Ok(None);
        };

        let mut absorbed = Vec::new();
        let mut stale = Vec::new();
        for member in &members {
            match self.store.get(member).await? {
                Some(item) => absorbed.push(item),
                None => stale.push(member.clone()),
            }
        }

        for item in &absorbed {
            if item.kind != representative.kind {
                tracing::debug!(
                    representative = %representative.id,
                    absorbed = %item.id,
                    representative_kind = %representative.kind,
                    absorbed_kind = %item.kind,
                    "Merging memory of a different kind; representative keeps its kind"
                );
            }
            for tag in &item.tags {
                push_unique(&mut representative.tags, tag);
            }
            representative.importance = representative.importance.max(item.importance);
            representative.confidence = representative.confidence.max(item.confidence);
            representative.access_count =
                representative.access_count.saturating_add(item.access_count);
            representative.last_accessed = representative.last_accessed.max(item.last_accessed);
            for id in &item.relationships {
                push_unique(&mut representative.relationships, id);
            }
            for id in &item.metadata.contradicts {
                push_unique(&mut representative.metadata.contradicts, id);
            }
            for variant in std::iter::once(&item.content).chain(&item.metadata.merged_variants) {
                if *variant != representative.content {
                    push_unique(&mut representative.metadata.merged_variants, variant);
                }
            }
        }

        let absorbed_ids: Vec<String> = absorbed.iter().map(|i| i.id.clone()).collect();
        let rep_id = representative.id.clone();
        let keep = |id: &String| *id != rep_id && !absorbed_ids.contains(id);
        representative.relationships.retain(keep);
        representative.relationships.truncate(self.config.max_relationships);
        representative.metadata.contradicts.retain(keep);

        if !absorbed.is_empty() {
            self.store.save(&representative, None).await?;
            for id in &absorbed_ids {
                self.store.delete(id).await?;
                self.with_index_mut(|index| index.remove(id))?;
            }
        }
        drop(guards);

        for id in &absorbed_ids {
            self.repoint_references(id, Some(&rep_id)).await?;
        }

        Ok(Some(MergeRecord {
            representative: rep_id,
            absorbed: absorbed_ids,
            stale,
        }))
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Delete memories past their kind's retention whose importance is
    /// below the configured floor; returns the deleted ids
    pub async fn prune_expired(&self, at: DateTime<Utc>) -> Result<Vec<String>> {
        let floor = self.config.retention_importance_floor;
        let items = self
            .store
            .list(&MemoryFilter::all().sorted(SortOrder::LastAccessedAsc))
            .await?;

        let mut pruned = Vec::new();
        for item in items {
            let expired = at - item.last_accessed > self.config.retention_for(item.kind);
            if !expired || item.importance >= floor {
                continue;
            }
            match self.delete(&item.id).await {
                Ok(()) => pruned.push(item.id),
                Err(MemoryError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if !pruned.is_empty() {
            tracing::info!(count = pruned.len(), "Pruned expired memories");
        }
        Ok(pruned)
    }

    /// Embed and index memories that have no persisted vector
    pub async fn repair_embeddings(&self) -> Result<RepairReport> {
        let ids = self.store.ids_without_vector().await?;
        let mut report = RepairReport::default();

        for chunk in ids.chunks(self.config.embedding_batch_size.max(1)) {
            let mut items = Vec::with_capacity(chunk.len());
            for id in chunk {
                if let Some(item) = self.store.get(id).await? {
                    items.push(item);
                }
            }
            let texts: Vec<&str> = items.iter().map(|i| i.content.as_str()).collect();
            let vectors = match self.embedder.embed_batch(&texts).await {
                Ok(vectors) => vectors,
                Err(e) => {
                    tracing::warn!(error = %e, count = items.len(), "Embedding repair batch failed");
                    report.failed.extend(items.into_iter().map(|i| i.id));
                    continue;
                }
            };

            for (item, vector) in items.into_iter().zip(vectors) {
                let _guard = self.locks.lock(&item.id).await;
                let Some(current) = self.store.get(&item.id).await? else {
                    continue;
                };
                if current.content != item.content {
                    // Rewritten since the batch was embedded
                    report.failed.push(item.id);
                    continue;
                }
                let stored = StoredVector::new(&item.id, self.embedder.model_name(), vector.clone());
                match self.store.save(&current, Some(&stored)).await {
                    Ok(()) => {
                        self.with_index_mut(|index| index.upsert(&item.id, vector))??;
                        report.repaired.push(item.id);
                    }
                    Err(StorageError::NotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if !report.repaired.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                repaired = report.repaired.len(),
                failed = report.failed.len(),
                "Embedding repair complete"
            );
        }
        Ok(report)
    }

    /// Reload the vector index from the persistent store
    pub async fn rebuild_index(&self) -> Result<RebuildStats> {
        let vectors = self.store.vectors().await?;
        let stats = self.with_index_mut(|index| index.rebuild(vectors))?;
        tracing::info!(indexed = stats.indexed, "Vector index rebuilt");
        Ok(stats)
    }

    /// Aggregate statistics
    pub async fn stats(&self) -> Result<MemoryStats> {
        let items = self.store.list(&MemoryFilter::all()).await?;
        let missing = self.store.ids_without_vector().await?.len();
        let last_consolidation = self.store.last_consolidation().await?;
        let indexed = self.with_index(VectorIndex::len)?;

        let mut stats = MemoryStats {
            total_memories: items.len(),
            with_vectors: items.len().saturating_sub(missing),
            indexed,
            last_consolidation,
            embedding_model: self.embedder.model_name().to_string(),
            cache: self.embedder.cache_stats(),
            ..Default::default()
        };

        let mut importance_sum = 0.0;
        for item in &items {
            *stats.by_kind.entry(item.kind).or_insert(0) += 1;
            if item.is_episode() {
                stats.episodes += 1;
            }
            importance_sum += item.importance;
            stats.oldest_memory = Some(
                stats
                    .oldest_memory
                    .map_or(item.created_at, |t| t.min(item.created_at)),
            );
            stats.newest_memory = Some(
                stats
                    .newest_memory
                    .map_or(item.created_at, |t| t.max(item.created_at)),
            );
        }
        if !items.is_empty() {
            stats.average_importance = importance_sum / items.len() as f64;
        }
        Ok(stats)
    }
}
