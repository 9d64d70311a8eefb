//! Embedding providers
//!
//! An embedding provider turns text into a fixed-length vector. The core
//! treats it as an external service: calls may be slow or fail, and
//! failures are reported as [`MemoryError::Provider`] without retrying.

pub mod local;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::{MemoryError, Result};

pub use local::LocalEmbeddings;
pub use openai::OpenAiEmbeddings;

/// Text-to-vector service
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. The result has exactly [`EmbeddingProvider::dimension`] entries.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}

/// Build the configured provider
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderKind::OpenAi => Ok(Arc::new(OpenAiEmbeddings::new(config)?)),
        EmbeddingProviderKind::Local => Ok(Arc::new(LocalEmbeddings::new(config)?)),
    }
}

/// Reject a provider response whose length differs from what was promised
pub(crate) fn check_response_dimension(expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(MemoryError::Provider(format!(
            "provider returned {} dimensions, expected {}",
            embedding.len(),
            expected
        )));
    }
    Ok(())
}
