//! Embedding provider capability.
//!
//! The neural model is optional. Callers ask [`EmbeddingProvider::is_available`]
//! and treat `false` as a normal degradation path.

use std::sync::Arc;

use thiserror::Error;

use crate::config::EmbeddingConfig;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] anyhow::Error),

    #[error("Embedding provider unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, EmbedderError>;

pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Embed a batch of texts (sync, CPU-bound).
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Provider used when embeddings are disabled or not compiled in.
pub struct NoEmbeddings;

impl EmbeddingProvider for NoEmbeddings {
    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(EmbedderError::Unavailable)
    }
}

#[cfg(feature = "embeddings")]
pub use fast::FastEmbedProvider;

#[cfg(feature = "embeddings")]
mod fast {
    use std::path::PathBuf;

    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    use super::{EmbedderError, EmbeddingProvider, Result};
    use crate::config::EmbeddingConfig;

    /// fastembed-backed provider.
    pub struct FastEmbedProvider {
        model: std::sync::Mutex<TextEmbedding>,
        model_name: String,
    }

    impl FastEmbedProvider {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let cache_dir = config
                .cache_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    dirs::cache_dir()
                        .unwrap_or_else(std::env::temp_dir)
                        .join("fastembed")
                });
            std::fs::create_dir_all(&cache_dir).ok();

            let model = match config.model.as_str() {
                "BGESmallENV15" | "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
                "BGEBaseENV15" | "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
                "AllMiniLML6V2" | "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
                other => {
                    tracing::warn!("Unknown embedding model '{}', falling back to BGESmallENV15", other);
                    EmbeddingModel::BGESmallENV15
                }
            };

            let model = TextEmbedding::try_new(
                InitOptions::new(model)
                    .with_cache_dir(cache_dir)
                    .with_show_download_progress(false),
            )
            .map_err(EmbedderError::Embedding)?;

            Ok(Self {
                model: std::sync::Mutex::new(model),
                model_name: config.model.clone(),
            })
        }
    }

    impl EmbeddingProvider for FastEmbedProvider {
        fn name(&self) -> &str {
            &self.model_name
        }

        fn is_available(&self) -> bool {
            true
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self.model.lock().map_err(|e| {
                EmbedderError::Embedding(anyhow::anyhow!("Mutex poisoned: {}", e))
            })?;
            model.embed(texts.to_vec(), None).map_err(EmbedderError::Embedding)
        }
    }
}

/// Build the provider selected by `config`. Any failure degrades to [`NoEmbeddings`].
pub fn provider_from_config(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    if !config.enabled {
        return Arc::new(NoEmbeddings);
    }

    #[cfg(feature = "embeddings")]
    {
        match FastEmbedProvider::new(config) {
            Ok(provider) => {
                tracing::info!("Embedding provider ready: {}", config.model);
                return Arc::new(provider);
            }
            Err(e) => {
                tracing::warn!("Embedding provider failed to start, continuing without: {}", e);
            }
        }
    }

    #[cfg(not(feature = "embeddings"))]
    tracing::warn!("Embeddings enabled in config but the `embeddings` feature is not compiled in");

    Arc::new(NoEmbeddings)
}

/// Calculate cosine similarity between two embedding vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);

        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_disabled_provider_is_unavailable() {
        let provider = provider_from_config(&EmbeddingConfig::default());
        assert!(!provider.is_available());
        assert!(matches!(provider.embed(&["x".into()]), Err(EmbedderError::Unavailable)));
    }
}
