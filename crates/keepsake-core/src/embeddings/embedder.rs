//! Embedder: provider + cache + timeout + dimension checks
//!
//! The only path from text to vector inside the engine. A vector leaves this
//! type only if it has the provider's dimension and finite components, so the
//! index never sees a partial or malformed embedding.

use std::sync::Arc;
use std::time::Duration;

use super::cache::{CacheStats, EmbeddingCache};
use super::provider::{EmbeddingError, EmbeddingProvider};
use crate::config::EngineConfig;
use crate::error::{MemoryError, Result};

/// Cached, time-bounded access to an [`EmbeddingProvider`]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    timeout: Duration,
    batch_size: usize,
}

impl Embedder {
    /// Wrap a provider using the configured cache size, timeout and batch size
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EngineConfig) -> Self {
        Self {
            provider,
            cache: EmbeddingCache::new(config.embedding_cache_capacity),
            timeout: config.embedding_timeout(),
            batch_size: config.embedding_batch_size.max(1),
        }
    }

    /// Provider model name
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Provider dimension
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Embed one text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.provider.model_name();
        if let Some(vector) = self.cache.get(model, text) {
            return Ok(vector);
        }

        let vector = tokio::time::timeout(self.timeout, self.provider.embed(text))
            .await
            .map_err(|_| EmbeddingError::Timeout(self.timeout_ms()))??;
        self.check(&vector)?;

        self.cache.put(model, text, vector.clone());
        Ok(vector)
    }

    /// Embed many texts, order preserving.
    ///
    /// Cached texts are served directly; the rest go to the provider in
    /// chunks of the configured batch size.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let model = self.provider.model_name();
        let mut out: Vec<Option<Vec<f32>>> = texts
            .iter()
            .map(|text| self.cache.get(model, text))
            .collect();

        let missing: Vec<usize> = out
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_none().then_some(i))
            .collect();

        for chunk in missing.chunks(self.batch_size) {
            let batch: Vec<&str> = chunk.iter().map(|&i| texts[i]).collect();
            let vectors = tokio::time::timeout(self.timeout, self.provider.embed_batch(&batch))
                .await
                .map_err(|_| EmbeddingError::Timeout(self.timeout_ms()))??;

            if vectors.len() != batch.len() {
                return Err(EmbeddingError::EmbeddingFailed(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                ))
                .into());
            }

            for (&i, vector) in chunk.iter().zip(vectors) {
                self.check(&vector)?;
                self.cache.put(model, texts[i], vector.clone());
                out[i] = Some(vector);
            }
        }

        out.into_iter()
            .map(|v| v.ok_or_else(|| MemoryError::Internal("batch slot left empty".into())))
            .collect()
    }

    fn check(&self, vector: &[f32]) -> Result<()> {
        let expected = self.provider.dimensions();
        if vector.len() != expected {
            return Err(MemoryError::DimensionMismatch {
                expected,
                got: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EmbeddingError::EmbeddingFailed(
                "vector contains non-finite values".to_string(),
            )
            .into());
        }
        Ok(())
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use std::sync::atomic::Ordering;

    fn embedder(provider: ScriptedProvider, timeout_ms: u64) -> (Embedder, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let config = EngineConfig {
            embedding_timeout_ms: timeout_ms,
            embedding_batch_size: 2,
            ..Default::default()
        };
        (Embedder::new(provider.clone(), &config), provider)
    }

    #[tokio::test]
    async fn test_cache_avoids_second_provider_call() {
        let (embedder, provider) = embedder(ScriptedProvider::new(), 1000);
        let a = embedder.embed("hello world").await.unwrap();
        let b = embedder.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(embedder.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_provider_error() {
        let mut slow = ScriptedProvider::new();
        slow.delay = Some(Duration::from_millis(200));
        let (embedder, _) = embedder(slow, 10);
        let err = embedder.embed("slow").await.unwrap_err();
        assert!(matches!(err, MemoryError::Provider(EmbeddingError::Timeout(10))));
        // Nothing cached after a timeout
        assert_eq!(embedder.cache_stats().len, 0);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let mut bad = ScriptedProvider::new();
        bad.wrong_dimension = true;
        let (embedder, _) = embedder(bad, 1000);
        let err = embedder.embed("short").await.unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch {
                expected: 32,
                got: 31
            }
        ));
    }

    #[tokio::test]
    async fn test_batch_mixes_cached_and_fresh_in_order() {
        let (embedder, provider) = embedder(ScriptedProvider::new(), 1000);
        let cached = embedder.embed("b").await.unwrap();

        let out = embedder.embed_batch(&["a", "b", "c", "d", "e"]).await.unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[1], cached);
        assert_eq!(out[0], provider.inner.embed_text("a"));
        assert_eq!(out[4], provider.inner.embed_text("e"));
        // 1 single call + 4 misses through the default per-text batch impl
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let failing = ScriptedProvider::new();
        failing.fail.store(true, Ordering::SeqCst);
        let (embedder, _) = embedder(failing, 1000);
        assert!(matches!(
            embedder.embed("x").await,
            Err(MemoryError::Provider(EmbeddingError::EmbeddingFailed(_)))
        ));
    }
}
