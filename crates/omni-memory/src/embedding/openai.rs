//! OpenAI-compatible embedding provider
//!
//! Calls `POST {api_url}/embeddings` with a bearer token read from the
//! environment variable named in the config. Works with any endpoint that
//! speaks the OpenAI embeddings wire format.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingProvider, check_response_dimension};
use crate::error::{MemoryError, Result};

/// Embedding provider for OpenAI-compatible HTTP APIs
#[derive(Debug)]
pub struct OpenAiEmbeddings {
    client: Client,
    config: EmbeddingConfig,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiEmbeddings {
    /// Create a provider from config.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`; returns a config error if it is not set.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            MemoryError::Config(format!("API key env var '{}' not set", config.api_key_env))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MemoryError::Provider(format!("Failed to create HTTP client: {e}")))?;

        info!(
            "OpenAI embeddings initialized with model: {}, api_url: {}",
            config.model, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    /// Only the text-embedding-3 family accepts a `dimensions` override
    fn requested_dimensions(&self) -> Option<usize> {
        self.config
            .model
            .starts_with("text-embedding-3")
            .then_some(self.config.dimension)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: text,
            dimensions: self.requested_dimensions(),
        };

        let url = format!("{}/embeddings", self.config.api_url.trim_end_matches('/'));
        debug!("Requesting embedding from: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MemoryError::Provider(format!("Embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(MemoryError::Provider(format!(
                "Embedding API returned {status}: {detail}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::Provider(format!("Malformed embedding response: {e}")))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MemoryError::Provider("Empty embedding response".to_string()))?;

        check_response_dimension(self.config.dimension, &embedding)?;
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_missing_api_key() {
        unsafe { env::remove_var("OMNI_TEST_MISSING_KEY") };

        let config = EmbeddingConfig {
            api_key_env: "OMNI_TEST_MISSING_KEY".to_string(),
            ..Default::default()
        };
        let err = OpenAiEmbeddings::new(&config).unwrap_err();

        assert!(matches!(err, MemoryError::Config(_)));
        assert!(err.to_string().contains("OMNI_TEST_MISSING_KEY"));
    }

    #[test]
    fn test_requested_dimensions_only_for_v3_models() {
        unsafe { env::set_var("OMNI_TEST_DIM_KEY", "k") };

        let config = EmbeddingConfig {
            api_key_env: "OMNI_TEST_DIM_KEY".to_string(),
            ..Default::default()
        };
        let provider = OpenAiEmbeddings::new(&config).unwrap();
        assert_eq!(provider.requested_dimensions(), Some(1536));

        let config = EmbeddingConfig {
            api_key_env: "OMNI_TEST_DIM_KEY".to_string(),
            model: "text-embedding-ada-002".to_string(),
            ..Default::default()
        };
        let provider = OpenAiEmbeddings::new(&config).unwrap();
        assert_eq!(provider.requested_dimensions(), None);
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: "hello",
            dimensions: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "text-embedding-3-small", "input": "hello"})
        );
    }
}
