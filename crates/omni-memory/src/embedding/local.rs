//! Local embedding provider backed by fastembed
//!
//! Runs an ONNX sentence-embedding model in-process. Inference is CPU-bound,
//! so each call runs on the blocking thread pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingProvider, check_response_dimension};
use crate::error::{MemoryError, Result};

/// Local models this provider knows how to load, with their output width
const KNOWN_MODELS: &[(&str, FastEmbedModel, usize)] = &[
    ("all-minilm-l6-v2", FastEmbedModel::AllMiniLML6V2, 384),
    ("bge-small-en-v1.5", FastEmbedModel::BGESmallENV15, 384),
    ("bge-base-en-v1.5", FastEmbedModel::BGEBaseENV15, 768),
    ("multilingual-e5-small", FastEmbedModel::MultilingualE5Small, 384),
    ("nomic-embed-text-v1.5", FastEmbedModel::NomicEmbedTextV15, 768),
];

/// Look up a model by name (case-insensitive)
pub fn resolve_model(name: &str) -> Result<(FastEmbedModel, usize)> {
    let wanted = name.to_ascii_lowercase();
    KNOWN_MODELS
        .iter()
        .find(|(known, _, _)| *known == wanted)
        .map(|(_, model, dim)| (model.clone(), *dim))
        .ok_or_else(|| {
            let names: Vec<&str> = KNOWN_MODELS.iter().map(|(n, _, _)| *n).collect();
            MemoryError::Config(format!(
                "Unknown local embedding model '{name}', expected one of: {}",
                names.join(", ")
            ))
        })
}

/// In-process embedding provider
pub struct LocalEmbeddings {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl LocalEmbeddings {
    /// Load the configured model, downloading it on first use.
    ///
    /// The configured dimension must match the model's output width.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dimension) = resolve_model(&config.model)?;
        if dimension != config.dimension {
            return Err(MemoryError::Config(format!(
                "Local model '{}' produces {dimension}-dimensional vectors, \
                 but embedding.dimension is {}",
                config.model, config.dimension
            )));
        }

        tracing::info!("Loading local embedding model: {}", config.model);
        let model = TextEmbedding::try_new(InitOptions::new(model))
            .map_err(|e| MemoryError::Provider(format!("Failed to load model: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        let embedding = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| MemoryError::Provider("Embedding model lock poisoned".to_string()))?;
            let embeddings = model
                .embed(vec![text], None)
                .map_err(|e| MemoryError::Provider(format!("Embedding failed: {e}")))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| MemoryError::Provider("No embedding returned".to_string()))
        })
        .await
        .map_err(|e| MemoryError::Provider(format!("Embedding task failed: {e}")))??;

        check_response_dimension(self.dimension, &embedding)?;
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "fastembed"
    }
}
