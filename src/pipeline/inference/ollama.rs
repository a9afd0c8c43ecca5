use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::types::TextGenerator;
use super::InferenceError;

/// Ollama HTTP client for the recommendation model.
///
/// No client-level timeout: callers bound every request with
/// [`guarded`](super::guarded).
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }

    /// Default Ollama instance at localhost:11434.
    pub fn default_local(model: &str) -> Self {
        Self::new("http://localhost:11434", model)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    InferenceError::Connection(self.base_url.clone())
                } else {
                    InferenceError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::ResponseParsing(e.to_string()))?;

        if parsed.response.trim().is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        Ok(parsed.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
