//! Local Semantic Embeddings
//!
//! Uses fastembed v5.11 for local ONNX inference.
//!
//! ## Model
//!
//! Nomic Embed Text v1.5 (768d, truncated to 256d Matryoshka, 8192 context).
//! The model is downloaded on first use into the platform cache directory.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::provider::{EmbeddingError, EmbeddingProvider, normalize};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Embedding dimensions after Matryoshka truncation
pub const EMBEDDING_DIMENSIONS: usize = 256;

/// Maximum text length in bytes (truncated on a char boundary if longer)
pub const MAX_TEXT_LENGTH: usize = 8192;

const MODEL_NAME: &str = "nomic-ai/nomic-embed-text-v1.5";

/// Get the default cache directory for fastembed models
/// Uses FASTEMBED_CACHE_PATH env var, or falls back to platform cache directory
fn get_cache_dir() -> PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "keepsake", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".cache/keepsake/fastembed");
    }

    PathBuf::from(".fastembed_cache")
}

/// Truncate to the Matryoshka prefix and re-normalize
fn matryoshka_truncate(mut vector: Vec<f32>) -> Vec<f32> {
    vector.truncate(EMBEDDING_DIMENSIONS);
    normalize(&mut vector);
    vector
}

fn clip(text: &str) -> &str {
    if text.len() <= MAX_TEXT_LENGTH {
        return text;
    }
    let mut end = MAX_TEXT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// PROVIDER
// ============================================================================

/// fastembed-backed embedding provider
pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbedder {
    /// Load (downloading if necessary) the model
    pub fn new() -> Result<Self, EmbeddingError> {
        let cache_dir = get_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(true)
            .with_cache_dir(cache_dir);

        let model = TextEmbedding::try_new(options).map_err(|e| {
            EmbeddingError::ModelInit(format!(
                "Failed to initialize {}: {}. \
                Ensure ONNX runtime is available and model files can be downloaded.",
                MODEL_NAME, e
            ))
        })?;

        tracing::info!(model = MODEL_NAME, "Local embedding model ready");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

fn embed_blocking(
    model: &Mutex<TextEmbedding>,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut model = model
        .lock()
        .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e)))?;
    let embeddings = model
        .embed(texts, None)
        .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
    Ok(embeddings.into_iter().map(matryoshka_truncate).collect())
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }
        let mut out = self.embed_batch(&[text]).await?;
        out.pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let owned: Vec<String> = texts.iter().map(|t| clip(t).to_string()).collect();
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || embed_blocking(&model, owned))
            .await
            .map_err(|e| EmbeddingError::EmbeddingFailed(format!("Embedding task failed: {}", e)))?
    }
}
