use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{InferenceService, PredictionTask, TextGenerator};
use super::InferenceError;

/// Canned generator for tests and offline runs. Counts calls.
pub struct MockTextGenerator {
    response: Mutex<Result<String, InferenceError>>,
    hang: bool,
    calls: AtomicUsize,
}

impl MockTextGenerator {
    pub fn new(response: &str) -> Self {
        Self {
            response: Mutex::new(Ok(response.to_string())),
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: InferenceError) -> Self {
        Self {
            response: Mutex::new(Err(error)),
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Never answers; exercises timeout and cancellation paths.
    pub fn hanging() -> Self {
        Self {
            response: Mutex::new(Err(InferenceError::EmptyOutput)),
            hang: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Replace the canned response.
    pub fn set_response(&self, response: &str) {
        if let Ok(mut guard) = self.response.lock() {
            *guard = Ok(response.to_string());
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.response
            .lock()
            .map_err(|e| InferenceError::HttpClient(e.to_string()))?
            .clone()
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Canned inference service. Returns fixed outputs per task.
pub struct MockInferenceService {
    length_of_stay: Vec<f64>,
    complication_risk: Vec<f64>,
    embedding: Vec<f32>,
    fail: bool,
    calls: AtomicUsize,
    last_features: Mutex<Option<Vec<f64>>>,
}

impl MockInferenceService {
    pub fn new(length_of_stay: f64, complication_risk: f64) -> Self {
        Self {
            length_of_stay: vec![length_of_stay],
            complication_risk: vec![complication_risk],
            embedding: vec![0.0; 8],
            fail: false,
            calls: AtomicUsize::new(0),
            last_features: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0.0, 0.0)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Feature vector of the most recent `predict` call.
    pub fn last_features(&self) -> Option<Vec<f64>> {
        self.last_features.lock().ok().and_then(|g| g.clone())
    }
}

#[async_trait]
impl InferenceService for MockInferenceService {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(InferenceError::Connection("mock".into()));
        }
        Ok(self.embedding.clone())
    }

    async fn predict(
        &self,
        task: PredictionTask,
        features: &[f64],
    ) -> Result<Vec<f64>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_features.lock() {
            *last = Some(features.to_vec());
        }
        if self.fail {
            return Err(InferenceError::Connection("mock".into()));
        }
        Ok(match task {
            PredictionTask::LengthOfStay => self.length_of_stay.clone(),
            PredictionTask::ComplicationRisk => self.complication_risk.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_generator_returns_configured_response() {
        let mock = MockTextGenerator::new("1. Texto.");
        assert_eq!(mock.generate("s", "p").await.unwrap(), "1. Texto.");
        assert_eq!(mock.call_count(), 1);
        mock.set_response("outro");
        assert_eq!(mock.generate("s", "p").await.unwrap(), "outro");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn failing_generator_returns_error() {
        let mock = MockTextGenerator::failing(InferenceError::Http {
            status: 500,
            body: "boom".into(),
        });
        assert!(matches!(
            mock.generate("s", "p").await,
            Err(InferenceError::Http { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn mock_inference_records_features() {
        let mock = MockInferenceService::new(4.0, 0.2);
        let out = mock
            .predict(PredictionTask::LengthOfStay, &[1.0, 2.0])
            .await
            .unwrap();
        assert_eq!(out, vec![4.0]);
        assert_eq!(mock.last_features(), Some(vec![1.0, 2.0]));
    }
}
