//! Vector Index
//!
//! In-memory, rebuildable map of memory id -> embedding. Exact (brute-force)
//! cosine search, so results are deterministic: ties always break by
//! ascending id.
//!
//! The index is a derived cache. The persistent store holds the vectors of
//! record and the index is rebuilt from them on startup.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::Serialize;

use crate::embeddings::cosine_similarity;
use crate::error::{MemoryError, Result};
use crate::memory::StoredVector;

// ============================================================================
// STATS
// ============================================================================

/// Index statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorIndexStats {
    /// Number of vectors
    pub total_vectors: usize,
    /// Vector dimension
    pub dimensions: usize,
    /// Embedding model
    pub model: String,
}

/// Outcome of a full rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildStats {
    /// Vectors loaded
    pub indexed: usize,
    /// Vectors produced by another model
    pub skipped_model: usize,
    /// Vectors with the wrong dimension
    pub skipped_dimension: usize,
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

/// Exact cosine-similarity index keyed by memory id
#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl VectorIndex {
    /// Create an empty index for one model/dimension
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions,
            vectors: HashMap::new(),
        }
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Get the dimensions of the index
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the model the index was built for
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check if an id exists in the index
    pub fn contains(&self, id: &str) -> bool {
        self.vectors.contains_key(id)
    }

    /// Vector for an id
    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    /// Insert or replace the vector for an id
    pub fn upsert(&mut self, id: &str, vector: Vec<f32>) -> Result<()> {
        self.check_dimensions(&vector)?;
        self.vectors.insert(id.to_string(), vector);
        Ok(())
    }

    /// Insert or replace from a persisted vector, checking its model
    pub fn upsert_stored(&mut self, stored: StoredVector) -> Result<()> {
        if stored.model != self.model {
            return Err(MemoryError::ModelMismatch {
                expected: self.model.clone(),
                got: stored.model,
            });
        }
        self.upsert(&stored.memory_id, stored.vector)
    }

    /// Remove an id; returns whether it was present
    pub fn remove(&mut self, id: &str) -> bool {
        self.vectors.remove(id).is_some()
    }

    /// Ids with similarity >= `threshold`, best first, ties by ascending id
    pub fn query(&self, vector: &[f32], threshold: f32, limit: usize) -> Result<Vec<(String, f32)>> {
        self.check_dimensions(vector)?;
        if limit == 0 {
            return Ok(vec![]);
        }

        let mut hits: Vec<(String, f32)> = self
            .vectors
            .iter()
            .map(|(id, v)| (id, cosine_similarity(vector, v)))
            .filter(|(_, sim)| *sim >= threshold)
            .map(|(id, sim)| (id.clone(), sim))
            .collect();

        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Greedy one-hop clustering over all ids in ascending-id order
    pub fn cluster(&self, threshold: f32) -> Vec<Vec<String>> {
        let mut order: Vec<String> = self.vectors.keys().cloned().collect();
        order.sort();
        // No deadline, so cancellation cannot occur
        self.cluster_in_order(&order, threshold, None)
            .unwrap_or_default()
    }

    /// Greedy one-hop clustering over a caller-chosen order.
    ///
    /// The next unclustered id becomes a seed; every later unclustered id
    /// whose similarity to the seed is >= `threshold` joins it. Membership is
    /// not transitive. The seed is always the first element of its cluster.
    /// Ids not in the index and repeated ids are ignored.
    pub fn cluster_in_order(
        &self,
        order: &[String],
        threshold: f32,
        deadline: Option<Instant>,
    ) -> Result<Vec<Vec<String>>> {
        let mut seen = HashSet::new();
        let live: Vec<(&String, &Vec<f32>)> = order
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| self.vectors.get(id).map(|v| (id, v)))
            .collect();

        let mut assigned = vec![false; live.len()];
        let mut clusters = Vec::new();

        for i in 0..live.len() {
            if assigned[i] {
                continue;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(MemoryError::Cancelled("clustering deadline elapsed".into()));
            }

            assigned[i] = true;
            let (seed_id, seed_vec) = live[i];
            let mut cluster = vec![seed_id.clone()];

            for j in (i + 1)..live.len() {
                if assigned[j] {
                    continue;
                }
                if cosine_similarity(seed_vec, live[j].1) >= threshold {
                    assigned[j] = true;
                    cluster.push(live[j].0.clone());
                }
            }
            clusters.push(cluster);
        }

        Ok(clusters)
    }

    /// Replace the contents with persisted vectors.
    ///
    /// Vectors from another model or with another dimension are skipped.
    pub fn rebuild(&mut self, vectors: Vec<StoredVector>) -> RebuildStats {
        let mut stats = RebuildStats::default();
        self.vectors.clear();

        for stored in vectors {
            if stored.model != self.model {
                stats.skipped_model += 1;
                continue;
            }
            if stored.vector.len() != self.dimensions {
                stats.skipped_dimension += 1;
                continue;
            }
            self.vectors.insert(stored.memory_id, stored.vector);
            stats.indexed += 1;
        }

        if stats.skipped_model + stats.skipped_dimension > 0 {
            tracing::warn!(
                skipped_model = stats.skipped_model,
                skipped_dimension = stats.skipped_dimension,
                "Skipped incompatible vectors during index rebuild"
            );
        }
        stats
    }

    /// Point-in-time copy of every `(id, vector)`, sorted by id
    pub fn snapshot(&self) -> Vec<(String, Vec<f32>)> {
        let mut out: Vec<(String, Vec<f32>)> = self
            .vectors
            .iter()
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Ids in the index, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.vectors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get index statistics
    pub fn stats(&self) -> VectorIndexStats {
        VectorIndexStats {
            total_vectors: self.len(),
            dimensions: self.dimensions,
            model: self.model.clone(),
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
