//! Test utilities for omni-memory - deterministic embedding providers
//!
//! These providers stand in for a real embedding service so the read and
//! write paths can be exercised without network access or model downloads.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};

/// Deterministic hash-based embeddings in [-1, 1].
///
/// Identical texts map to identical vectors; different texts map to
/// unrelated ones.
#[derive(Debug, Clone)]
pub struct MockEmbeddings {
    dimension: usize,
}

impl MockEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Generate a deterministic "embedding" from text using hashing.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        (0..self.dimension)
            .map(|i| {
                let x = seed
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9e3779b97f4a7c15);
                let normalized = (x as f32) / (u64::MAX as f32);
                (normalized * 2.0) - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Embeddings looked up from an explicit text -> vector table.
///
/// Texts missing from the table fall back to [`MockEmbeddings`]. Counts
/// calls so tests can assert whether the provider was reached.
#[derive(Debug)]
pub struct FixtureEmbeddings {
    vectors: HashMap<String, Vec<f32>>,
    fallback: MockEmbeddings,
    calls: AtomicUsize,
}

impl FixtureEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback: MockEmbeddings::new(dimension),
            calls: AtomicUsize::new(0),
        }
    }

    /// Map `text` to `vector`
    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Number of `embed` calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FixtureEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.vector_for(text)))
    }

    fn dimension(&self) -> usize {
        self.fallback.dimension
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

/// Provider whose every call fails, as an unreachable service would
#[derive(Debug, Clone)]
pub struct FailingEmbeddings {
    dimension: usize,
    reason: String,
}

impl FailingEmbeddings {
    pub fn new(dimension: usize, reason: impl Into<String>) -> Self {
        Self {
            dimension,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddings {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(MemoryError::Provider(self.reason.clone()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}
