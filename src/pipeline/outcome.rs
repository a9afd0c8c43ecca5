//! Adapter from a clinical context to the external inference model.
//!
//! No modelling happens here. This module builds the feature vector, sends
//! it to the inference service and maps the raw outputs to labels.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::intelligence::types::{ClinicalContext, TrendReport};
use crate::models::{RecoveryTrajectory, RiskLevel};

use super::inference::{guarded, CancelToken, InferenceError, InferenceService, PredictionTask};

pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Order of values in every feature vector.
pub const FEATURE_NAMES: [&str; 8] = [
    "age",
    "diagnosis_count",
    "procedure_count",
    "medication_count",
    "temperature",
    "systolic_bp",
    "heart_rate",
    "oxygen_saturation",
];

/// Values substituted for measurements the record does not carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureDefaults {
    pub age: f64,
    pub temperature: f64,
    pub systolic_bp: f64,
    pub heart_rate: f64,
    pub oxygen_saturation: f64,
}

impl Default for FeatureDefaults {
    fn default() -> Self {
        Self {
            age: 60.0,
            temperature: 36.8,
            systolic_bp: 120.0,
            heart_rate: 80.0,
            oxygen_saturation: 97.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector(pub [f64; 8]);

impl FeatureVector {
    pub fn from_context(context: &ClinicalContext, defaults: &FeatureDefaults) -> Self {
        let vitals = context.latest_vitals.as_ref();
        Self([
            context.age.map_or(defaults.age, f64::from),
            context.diagnoses.len() as f64,
            context.procedures.len() as f64,
            context.medications.iter().filter(|m| m.is_active()).count() as f64,
            vitals
                .and_then(|v| v.temperature)
                .unwrap_or(defaults.temperature),
            vitals
                .and_then(|v| v.systolic())
                .unwrap_or(defaults.systolic_bp),
            vitals
                .and_then(|v| v.heart_rate)
                .unwrap_or(defaults.heart_rate),
            vitals
                .and_then(|v| v.oxygen_saturation)
                .unwrap_or(defaults.oxygen_saturation),
        ])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplicationRisk {
    /// Clamped to [0, 1].
    pub probability: f64,
    pub level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedOutcomes {
    pub length_of_stay_days: u32,
    pub complication: ComplicationRisk,
    pub recovery_trajectory: RecoveryTrajectory,
}

pub struct OutcomePredictor {
    service: Arc<dyn InferenceService>,
    defaults: FeatureDefaults,
    timeout: Duration,
}

impl OutcomePredictor {
    pub fn new(service: Arc<dyn InferenceService>) -> Self {
        Self {
            service,
            defaults: FeatureDefaults::default(),
            timeout: DEFAULT_INFERENCE_TIMEOUT,
        }
    }

    pub fn with_defaults(mut self, defaults: FeatureDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn features(&self, context: &ClinicalContext) -> FeatureVector {
        FeatureVector::from_context(context, &self.defaults)
    }

    /// Predicted stay in whole days, never below 1.
    pub async fn length_of_stay(
        &self,
        features: &FeatureVector,
        cancel: &CancelToken,
    ) -> Result<u32, InferenceError> {
        let days = self
            .first_output(PredictionTask::LengthOfStay, features, cancel)
            .await?;
        Ok(days.round().max(1.0) as u32)
    }

    pub async fn complication_risk(
        &self,
        features: &FeatureVector,
        cancel: &CancelToken,
    ) -> Result<ComplicationRisk, InferenceError> {
        let raw = self
            .first_output(PredictionTask::ComplicationRisk, features, cancel)
            .await?;
        let probability = raw.clamp(0.0, 1.0);
        Ok(ComplicationRisk {
            probability,
            level: RiskLevel::from_score(probability),
        })
    }

    /// All three outcome estimates for one patient.
    pub async fn predict(
        &self,
        context: &ClinicalContext,
        trends: &TrendReport,
        cancel: &CancelToken,
    ) -> Result<PredictedOutcomes, InferenceError> {
        let features = self.features(context);
        let length_of_stay_days = self.length_of_stay(&features, cancel).await?;
        let complication = self.complication_risk(&features, cancel).await?;

        tracing::debug!(
            length_of_stay_days,
            complication_probability = complication.probability,
            "Outcome prediction complete"
        );

        Ok(PredictedOutcomes {
            length_of_stay_days,
            complication,
            recovery_trajectory: recovery_trajectory(trends),
        })
    }

    /// Sentence embedding of free text.
    pub async fn embed_text(
        &self,
        text: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<f32>, InferenceError> {
        guarded(self.service.embed(text), self.timeout, cancel).await
    }

    async fn first_output(
        &self,
        task: PredictionTask,
        features: &FeatureVector,
        cancel: &CancelToken,
    ) -> Result<f64, InferenceError> {
        let outputs = guarded(
            self.service.predict(task, features.as_slice()),
            self.timeout,
            cancel,
        )
        .await?;
        let value = outputs.first().copied().ok_or(InferenceError::EmptyOutput)?;
        if !value.is_finite() {
            return Err(InferenceError::ResponseParsing(format!(
                "{} output is not a finite number",
                task.as_str()
            )));
        }
        Ok(value)
    }
}

/// Favorable when some channel improves and none worsens; unfavorable in
/// the reverse case; stable otherwise (including mixed signals).
pub fn recovery_trajectory(trends: &TrendReport) -> RecoveryTrajectory {
    let favorable = trends.channels.iter().any(|c| c.is_favorable());
    let adverse = trends.channels.iter().any(|c| c.is_adverse());
    match (favorable, adverse) {
        (true, false) => RecoveryTrajectory::Favorable,
        (false, true) => RecoveryTrajectory::Unfavorable,
        _ => RecoveryTrajectory::Stable,
    }
}
