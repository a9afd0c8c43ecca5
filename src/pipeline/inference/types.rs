use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::InferenceError;

/// Generative text model: system + user prompt in, raw text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, InferenceError>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// Embedding and numeric-prediction model.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError>;

    async fn predict(
        &self,
        task: PredictionTask,
        features: &[f64],
    ) -> Result<Vec<f64>, InferenceError>;
}

/// Which head of the inference model a feature vector is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionTask {
    LengthOfStay,
    ComplicationRisk,
}

impl PredictionTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LengthOfStay => "length_of_stay",
            Self::ComplicationRisk => "complication_risk",
        }
    }
}
