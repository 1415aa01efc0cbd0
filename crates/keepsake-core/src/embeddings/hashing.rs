//! Feature-hashing embedder
//!
//! Deterministic, dependency-free bag-of-words embedding: every lowercase
//! alphanumeric token increments one bucket chosen by a 64-bit FNV-1a hash,
//! and the result is L2-normalized. Texts sharing most of their words land
//! close together, which is all the dedup and consolidation paths need when
//! no neural model is available.

use async_trait::async_trait;

use super::provider::{EmbeddingError, EmbeddingProvider, normalize};

/// Default bucket count
pub const DEFAULT_HASHING_DIMENSIONS: usize = 512;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Token feature-hashing embedding provider
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_name: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSIONS)
    }
}

impl HashingEmbedder {
    /// Create an embedder with `dimensions` buckets (minimum 1)
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_name: format!("keepsake-hashing-v1-{}", dimensions),
        }
    }

    /// Embed synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in tokens(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
