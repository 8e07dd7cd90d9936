use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::BackendSettings;
use crate::error::CapabilityError;

use super::{classify_status, classify_transport_error};

/// Embedding capability: text in, fixed-length vector out. The configured
/// target dimensionality is a contract; a provider returning any other
/// length is a permanent failure, not something to negotiate at call time.
pub trait Embedding {
    async fn embed(
        &self,
        text: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Vec<f32>, CapabilityError>;
}

/// Client for an Ollama-compatible embeddings endpoint.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.embedding_url.clone(),
            model: settings.embedding_model.clone(),
        }
    }
}

impl Embedding for OllamaEmbedder {
    async fn embed(
        &self,
        text: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Vec<f32>, CapabilityError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CapabilityError::Permanent(
                "embedding input text is empty".to_string(),
            ));
        }

        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingsRequest {
            model: &self.model,
            prompt: trimmed,
        };

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|err| {
            CapabilityError::Permanent(format!("malformed embeddings response: {err}"))
        })?;

        if parsed.embedding.len() != dimension {
            return Err(CapabilityError::Permanent(format!(
                "embedding dimension mismatch: expected {}, got {}",
                dimension,
                parsed.embedding.len()
            )));
        }

        Ok(parsed.embedding)
    }
}
