//! Shared unit-test fixtures

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::embeddings::{Embedder, EmbeddingError, EmbeddingProvider, HashingEmbedder};
use crate::long_term::LongTermStore;
use crate::search::VectorIndex;
use crate::storage::{InMemoryStore, PersistentStore};

/// Provider that counts calls and can misbehave on demand
pub(crate) struct ScriptedProvider {
    pub inner: HashingEmbedder,
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
    pub wrong_dimension: bool,
    pub fail: AtomicBool,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(32),
            calls: AtomicUsize::new(0),
            delay: None,
            wrong_dimension: false,
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn dimensions(&self) -> usize {
        32
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::EmbeddingFailed("scripted failure".into()));
        }
        let mut v = self.inner.embed_text(text);
        if self.wrong_dimension {
            v.pop();
        }
        Ok(v)
    }
}

/// Long-term store over an in-memory backend and the hashing embedder
pub(crate) fn long_term_store() -> (LongTermStore, Arc<InMemoryStore>) {
    long_term_store_with(EngineConfig::default(), Arc::new(HashingEmbedder::default()))
}

/// Long-term store over an in-memory backend with a custom provider
pub(crate) fn long_term_store_with(
    config: EngineConfig,
    provider: Arc<dyn EmbeddingProvider>,
) -> (LongTermStore, Arc<InMemoryStore>) {
    let backend = Arc::new(InMemoryStore::new());
    let config = Arc::new(config);
    let embedder = Arc::new(Embedder::new(provider.clone(), &config));
    let index = VectorIndex::new(provider.model_name(), provider.dimensions());
    let store: Arc<dyn PersistentStore> = backend.clone();
    (
        LongTermStore::new(config, embedder, index, store),
        backend,
    )
}
