use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::{InferenceService, PredictionTask};
use super::InferenceError;

/// JSON client for the hosted embedding / prediction model.
///
/// `POST {base}/embed {"text"}` returns `{"embedding": [...]}` and
/// `POST {base}/predict {"task", "features"}` returns `{"outputs": [...]}`.
pub struct HttpInferenceClient {
    base_url: String,
    client: Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    task: PredictionTask,
    features: &'a [f64],
}

#[derive(Deserialize)]
struct PredictResponse {
    outputs: Vec<f64>,
}

impl HttpInferenceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, InferenceError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
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

        response
            .json()
            .await
            .map_err(|e| InferenceError::ResponseParsing(e.to_string()))
    }
}

#[async_trait]
impl InferenceService for HttpInferenceClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let parsed: EmbedResponse = self.post_json("embed", &EmbedRequest { text }).await?;
        if parsed.embedding.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        Ok(parsed.embedding)
    }

    async fn predict(
        &self,
        task: PredictionTask,
        features: &[f64],
    ) -> Result<Vec<f64>, InferenceError> {
        let parsed: PredictResponse = self
            .post_json("predict", &PredictRequest { task, features })
            .await?;
        if parsed.outputs.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        Ok(parsed.outputs)
    }
}
