//! Duplicate consolidation
//!
//! Clusters near-duplicate memories over a snapshot of the vector index and
//! folds each cluster into its strongest member:
//!
//! 1. **Order**: importance desc, access count desc, oldest first, then id
//! 2. **Cluster**: greedy one-hop clustering in that order, per owner scope.
//!    Episodes are never clustered.
//! 3. **Merge**: per cluster, under the members' locks
//! 4. **Record**: the run is written to the consolidation history
//!
//! Representatives keep their content and vector and surviving seeds are
//! pairwise below the threshold, so a second run with no writes in between
//! changes nothing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::error::{MemoryError, Result};
use crate::long_term::LongTermStore;
use crate::memory::{ConsolidationReport, MaintenanceReport, MemoryItem, MergeRecord, now};
use crate::storage::MemoryFilter;

/// Merge order: strongest memory first
fn strength_order(a: &MemoryItem, b: &MemoryItem) -> std::cmp::Ordering {
    b.importance
        .total_cmp(&a.importance)
        .then_with(|| b.access_count.cmp(&a.access_count))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Tracks a consolidation run in progress
struct ConsolidationRun {
    start_time: Instant,
    threshold: f64,
    clusters_found: usize,
    memories_merged: usize,
    stale_skipped: usize,
    merges: Vec<MergeRecord>,
}

impl ConsolidationRun {
    fn start(threshold: f64) -> Self {
        Self {
            start_time: Instant::now(),
            threshold,
            clusters_found: 0,
            memories_merged: 0,
            stale_skipped: 0,
            merges: Vec::new(),
        }
    }

    fn record_merge(&mut self, record: MergeRecord) {
        self.memories_merged += record.absorbed.len();
        self.stale_skipped += record.stale.len();
        if !record.absorbed.is_empty() {
            self.merges.push(record);
        }
    }

    fn record_stale_cluster(&mut self, size: usize) {
        self.stale_skipped += size;
    }

    fn finish(self, memories_before: usize, memories_after: usize) -> ConsolidationReport {
        ConsolidationReport {
            threshold: self.threshold,
            memories_before,
            memories_after,
            clusters_found: self.clusters_found,
            memories_merged: self.memories_merged,
            stale_skipped: self.stale_skipped,
            merges: self.merges,
            completed_at: Some(now()),
            duration_ms: self.start_time.elapsed().as_millis() as i64,
        }
    }
}

type ScopeKey = (Option<String>, Option<String>, Option<String>);

fn scope_key(item: &MemoryItem) -> ScopeKey {
    let (user, conversation, workspace) = item.context.scope();
    (
        user.map(str::to_string),
        conversation.map(str::to_string),
        workspace.map(str::to_string),
    )
}

/// Consolidation over a long-term store
#[derive(Clone)]
pub struct ConsolidationEngine {
    long_term: Arc<LongTermStore>,
}

impl ConsolidationEngine {
    /// Create an engine over a long-term store
    pub fn new(long_term: Arc<LongTermStore>) -> Self {
        Self { long_term }
    }

    /// Underlying long-term store
    pub fn long_term(&self) -> &Arc<LongTermStore> {
        &self.long_term
    }

    /// Merge every cluster of memories with pairwise similarity to its seed
    /// at or above `threshold`.
    ///
    /// `deadline` bounds the clustering pass; merges already applied stay
    /// applied when it elapses.
    pub async fn consolidate(
        &self,
        threshold: f64,
        deadline: Option<Instant>,
    ) -> Result<ConsolidationReport> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(MemoryError::invalid(format!(
                "consolidation threshold must be between 0.0 and 1.0 (got {})",
                threshold
            )));
        }

        let mut run = ConsolidationRun::start(threshold);
        let store = self.long_term.persistent();

        let mut items = store.list(&MemoryFilter::all()).await?;
        let memories_before = items.len();
        items.sort_by(strength_order);

        // Episodes keep their own outcomes; other memories only merge within their scope
        let mut scopes: BTreeMap<ScopeKey, Vec<String>> = BTreeMap::new();
        for item in items.into_iter().filter(|i| !i.is_episode()) {
            scopes.entry(scope_key(&item)).or_default().push(item.id);
        }

        let mut clusters = Vec::new();
        for order in scopes.values() {
            clusters.extend(
                self.long_term
                    .with_index(|index| index.cluster_in_order(order, threshold as f32, deadline))??,
            );
        }

        for cluster in clusters.into_iter().filter(|c| c.len() > 1) {
            run.clusters_found += 1;
            let (seed, members) = cluster.split_at(1);
            match self.long_term.merge(&seed[0], members).await? {
                Some(record) => run.record_merge(record),
                None => run.record_stale_cluster(cluster.len()),
            }
        }

        let memories_after = store.count(&MemoryFilter::all()).await?;
        let report = run.finish(memories_before, memories_after);

        if let Err(e) = store.record_consolidation(&report).await {
            tracing::warn!(error = %e, "Failed to record consolidation run");
        }

        tracing::info!(
            threshold,
            clusters_found = report.clusters_found,
            memories_merged = report.memories_merged,
            stale_skipped = report.stale_skipped,
            memories_after = report.memories_after,
            duration_ms = report.duration_ms,
            "Consolidation complete"
        );
        Ok(report)
    }

    /// Consolidate at the configured threshold, then prune expired memories
    pub async fn run_maintenance(&self, at: DateTime<Utc>) -> Result<MaintenanceReport> {
        let threshold = self.long_term.config().consolidation_threshold;
        let consolidation = self.consolidate(threshold, None).await?;
        let pruned = self.long_term.prune_expired(at).await?;
        Ok(MaintenanceReport {
            consolidation,
            pruned,
        })
    }
}
