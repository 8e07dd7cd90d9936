use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::BackendSettings;
use crate::error::CapabilityError;

use super::{classify_status, classify_transport_error};

/// Optional generation-parameter bundle forwarded with a completion call.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    /// Ask the provider to constrain output to a single JSON object.
    pub json_format: bool,
}

/// Text-generation capability. Returns the model's raw text; interpreting it
/// (term list, JSON object) stays with the caller.
pub trait TextGeneration {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: GenerationOptions,
        timeout: Duration,
    ) -> Result<String, CapabilityError>;
}

/// Chat client for an Ollama-compatible endpoint.
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatRequestOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequestOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<serde_json::Value>,
}

impl OllamaGenerator {
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.generation_url.clone(),
            model: settings.generation_model.clone(),
        }
    }

    /// Reachability probe: lists installed models.
    pub async fn list_model_count(&self, timeout: Duration) -> Result<usize, CapabilityError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|err| CapabilityError::Permanent(format!("malformed tags response: {err}")))?;
        Ok(tags.models.len())
    }
}

impl TextGeneration for OllamaGenerator {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: GenerationOptions,
        timeout: Duration,
    ) -> Result<String, CapabilityError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            stream: false,
            format: options.json_format.then_some("json"),
            options: options
                .temperature
                .map(|temperature| ChatRequestOptions { temperature }),
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

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| CapabilityError::Permanent(format!("malformed chat response: {err}")))?;
        Ok(parsed.message.content)
    }
}
