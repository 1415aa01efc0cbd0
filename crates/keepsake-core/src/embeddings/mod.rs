//! Embeddings Module
//!
//! - `EmbeddingProvider`: the injected text-to-vector collaborator
//! - `Embedder`: provider wrapped with an LRU cache, timeout and checks
//! - `HashingEmbedder`: deterministic feature-hashing provider (always available)
//! - `LocalEmbedder`: fastembed ONNX provider (feature `local-embeddings`)

mod cache;
mod embedder;
mod hashing;
#[cfg(feature = "local-embeddings")]
mod local;
mod provider;

pub use cache::{CacheKey, CacheStats, EmbeddingCache};
pub use embedder::Embedder;
pub use hashing::{DEFAULT_HASHING_DIMENSIONS, HashingEmbedder};
#[cfg(feature = "local-embeddings")]
pub use local::{EMBEDDING_DIMENSIONS, LocalEmbedder, MAX_TEXT_LENGTH};
pub use provider::{Embedding, EmbeddingError, EmbeddingProvider, cosine_similarity, normalize};
