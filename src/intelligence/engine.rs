use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::{PatientRecord, RiskLevel};
use crate::pipeline::inference::{
    CancelToken, HttpInferenceClient, InferenceService, OllamaGenerator, TextGenerator,
};
use crate::pipeline::outcome::OutcomePredictor;
use crate::pipeline::recommendations::RecommendationCache;

use super::context::ClinicalContextBuilder;
use super::interactions::MedicationInteractionChecker;
use super::reference::ClinicalReferenceData;
use super::risk::RiskScorer;
use super::trends::VitalTrendAnalyzer;
use super::types::{
    ClinicalAnalysis, ClinicalContext, EngineError, PatientAnalysis, ReferenceDataError,
    RiskAssessment,
};

/// Caller-facing entry point. Wires the deterministic analyzers, the
/// recommendation cache and the outcome predictor around injected services.
pub struct ClinicalAnalysisEngine {
    reference: Arc<ClinicalReferenceData>,
    cache: RecommendationCache,
    predictor: OutcomePredictor,
}

impl ClinicalAnalysisEngine {
    pub fn new(
        reference: Arc<ClinicalReferenceData>,
        generator: Arc<dyn TextGenerator>,
        inference: Arc<dyn InferenceService>,
        config: &EngineConfig,
    ) -> Self {
        let cache = RecommendationCache::new(generator)
            .with_capacity(config.cache_capacity)
            .with_max_age(config.cache_max_age())
            .with_timeout(config.generation_timeout());
        let predictor = OutcomePredictor::new(inference)
            .with_defaults(config.feature_defaults.clone())
            .with_timeout(config.inference_timeout());

        Self {
            reference,
            cache,
            predictor,
        }
    }

    /// Engine backed by the HTTP clients and reference data named in `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ReferenceDataError> {
        let reference = match config.reference_data_file() {
            Some(path) => ClinicalReferenceData::load(&path)?,
            None => ClinicalReferenceData::bundled()?,
        };
        tracing::info!(
            ollama = %config.ollama_url,
            model = %config.model,
            inference = %config.inference_url,
            "Clinical analysis engine configured"
        );
        Ok(Self::new(
            Arc::new(reference),
            Arc::new(OllamaGenerator::new(&config.ollama_url, &config.model)),
            Arc::new(HttpInferenceClient::new(&config.inference_url)),
            config,
        ))
    }

    pub fn reference(&self) -> &ClinicalReferenceData {
        &self.reference
    }

    pub fn cache(&self) -> &RecommendationCache {
        &self.cache
    }

    pub fn predictor(&self) -> &OutcomePredictor {
        &self.predictor
    }

    /// Context plus risk assessment. When the record carries no usable risk
    /// label, the context takes the computed level.
    pub fn build_context(&self, record: &PatientRecord) -> (ClinicalContext, RiskAssessment) {
        let mut context = ClinicalContextBuilder::new(&self.reference).build(record);
        let risk = RiskScorer::new(&self.reference).assess(&context);
        let has_label = record
            .risk_level
            .as_deref()
            .and_then(RiskLevel::parse_label)
            .is_some();
        if !has_label {
            context.risk_level = risk.level;
        }
        (context, risk)
    }

    /// Deterministic part of the analysis. Never fails.
    pub fn analyze(&self, record: &PatientRecord) -> (ClinicalAnalysis, RiskAssessment) {
        let (context, risk) = self.build_context(record);
        let trends = VitalTrendAnalyzer::analyze(&record.vitals);
        let interactions =
            MedicationInteractionChecker::new(&self.reference).check(&context.medications);

        (
            ClinicalAnalysis {
                context,
                trends,
                interactions,
            },
            risk,
        )
    }

    pub async fn analyze_patient(
        &self,
        record: &PatientRecord,
        cancel: &CancelToken,
    ) -> Result<PatientAnalysis, EngineError> {
        let start = Instant::now();
        let id = Uuid::new_v4();
        let (analysis, risk_analysis) = self.analyze(record);

        let predicted_outcomes = self
            .predictor
            .predict(&analysis.context, &analysis.trends, cancel)
            .await
            .map_err(|e| {
                tracing::error!(
                    analysis_id = %id,
                    patient_id = record.id.as_deref().unwrap_or("-"),
                    error = %e,
                    "Outcome prediction failed"
                );
                EngineError::AnalysisFailed
            })?;

        tracing::info!(
            analysis_id = %id,
            patient_id = record.id.as_deref().unwrap_or("-"),
            risk_level = risk_analysis.level.as_str(),
            risk_score = risk_analysis.score,
            trend = analysis.trends.aggregate.as_str(),
            interactions = analysis.interactions.findings.len(),
            processing_ms = start.elapsed().as_millis() as u64,
            "Patient analysis complete"
        );

        Ok(PatientAnalysis {
            id,
            risk_analysis,
            analysis,
            predicted_outcomes,
        })
    }

    /// Exactly five validated recommendations for the patient.
    pub async fn generate_recommendations(
        &self,
        record: &PatientRecord,
        cancel: &CancelToken,
    ) -> Result<Vec<String>, EngineError> {
        let (context, _) = self.build_context(record);
        let lookup = self.cache.lookup(&context, cancel).await.map_err(|e| {
            tracing::error!(
                patient_id = record.id.as_deref().unwrap_or("-"),
                error = %e,
                "Recommendation generation failed"
            );
            EngineError::RecommendationFailed
        })?;

        tracing::debug!(
            patient_id = record.id.as_deref().unwrap_or("-"),
            source = ?lookup.source,
            confidence = lookup.confidence,
            "Recommendations served"
        );
        Ok(lookup.recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::models::{
        AggregateTrend, Medication, PersonalInfo, RecoveryTrajectory, VitalReading,
    };
    use crate::pipeline::inference::{
        cancel_pair, InferenceError, MockInferenceService, MockTextGenerator,
    };

    const FIVE: &str = "1. Revisar a dose de varfarina e monitorar o INR diariamente.
2. Aferir sinais vitais a cada 4 horas e comunicar febre acima de 38 °C.
3. Manter analgesia regular e avaliar conforto durante o banho no leito.
4. Orientar o cuidador sobre mudança de decúbito a cada 2 horas.
5. Agendar retorno ambulatorial em 7 dias com hemograma de controle.";

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn record() -> PatientRecord {
        let vitals = [36.5, 36.6, 36.4, 39.0, 39.2, 39.1]
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut v = VitalReading::new(ts(i as u32));
                v.temperature = Some(*t);
                v
            })
            .collect();
        PatientRecord {
            id: Some("p-001".into()),
            personal_info: Some(PersonalInfo {
                name: Some("Maria".into()),
                age: Some(70),
                birth_date: None,
            }),
            diagnoses: vec!["sepse".into()],
            risk_level: None,
            vitals,
            medications: vec![Medication::named("warfarin"), Medication::named("omeprazole")],
            procedures: Vec::new(),
            assessment: None,
        }
    }

    fn engine(
        generator: Arc<MockTextGenerator>,
        inference: Arc<MockInferenceService>,
    ) -> ClinicalAnalysisEngine {
        ClinicalAnalysisEngine::new(
            Arc::new(ClinicalReferenceData::bundled().unwrap()),
            generator,
            inference,
            &EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn analyze_patient_combines_all_components() {
        let engine = engine(
            Arc::new(MockTextGenerator::new(FIVE)),
            Arc::new(MockInferenceService::new(7.2, 0.35)),
        );
        let result = engine
            .analyze_patient(&record(), &CancelToken::never())
            .await
            .unwrap();

        assert!(!result.id.is_nil());
        assert_eq!(result.risk_analysis.score, 0.7);
        assert_eq!(result.risk_analysis.level, RiskLevel::Medium);
        assert_eq!(result.analysis.context.risk_level, RiskLevel::Medium);
        assert_eq!(result.analysis.trends.aggregate, AggregateTrend::Deteriorating);
        assert_eq!(result.analysis.interactions.findings.len(), 1);
        assert_eq!(result.predicted_outcomes.length_of_stay_days, 7);
        assert_eq!(result.predicted_outcomes.complication.level, RiskLevel::Low);
        assert_eq!(
            result.predicted_outcomes.recovery_trajectory,
            RecoveryTrajectory::Unfavorable
        );
    }

    #[tokio::test]
    async fn recorded_risk_label_is_kept() {
        let engine = engine(
            Arc::new(MockTextGenerator::new(FIVE)),
            Arc::new(MockInferenceService::new(3.0, 0.1)),
        );
        let mut record = record();
        record.risk_level = Some("Alto".into());
        let (context, risk) = engine.build_context(&record);
        assert_eq!(context.risk_level, RiskLevel::High);
        assert_eq!(risk.level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn empty_record_is_analyzed_with_defaults() {
        let engine = engine(
            Arc::new(MockTextGenerator::new(FIVE)),
            Arc::new(MockInferenceService::new(2.0, 0.05)),
        );
        let result = engine
            .analyze_patient(&PatientRecord::default(), &CancelToken::never())
            .await
            .unwrap();
        assert!(result.analysis.context.age.is_none());
        assert_eq!(result.risk_analysis.level, RiskLevel::Low);
        assert_eq!(
            result.analysis.trends.aggregate,
            AggregateTrend::InsufficientData
        );
        assert!(result.analysis.interactions.is_clear());
    }

    #[tokio::test]
    async fn inference_failure_surfaces_generic_error() {
        let engine = engine(
            Arc::new(MockTextGenerator::new(FIVE)),
            Arc::new(MockInferenceService::failing()),
        );
        let err = engine
            .analyze_patient(&record(), &CancelToken::never())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::AnalysisFailed);
        assert_eq!(err.to_string(), "Failed to analyze patient");
    }

    #[tokio::test]
    async fn recommendations_are_cached_per_patient_context() {
        let generator = Arc::new(MockTextGenerator::new(FIVE));
        let engine = engine(generator.clone(), Arc::new(MockInferenceService::new(1.0, 0.0)));

        let first = engine
            .generate_recommendations(&record(), &CancelToken::never())
            .await
            .unwrap();
        let second = engine
            .generate_recommendations(&record(), &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
        assert_eq!(generator.call_count(), 1);
        assert_eq!(engine.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn invalid_output_surfaces_generic_error() {
        let four: String = FIVE.lines().take(4).collect::<Vec<_>>().join("\n");
        let generator = Arc::new(MockTextGenerator::new(&four));
        let engine = engine(generator, Arc::new(MockInferenceService::new(1.0, 0.0)));
        let err = engine
            .generate_recommendations(&record(), &CancelToken::never())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate recommendations");
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn service_error_is_not_exposed() {
        let generator = Arc::new(MockTextGenerator::failing(InferenceError::Http {
            status: 503,
            body: "model loading".into(),
        }));
        let engine = engine(generator, Arc::new(MockInferenceService::new(1.0, 0.0)));
        let err = engine
            .generate_recommendations(&record(), &CancelToken::never())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::RecommendationFailed);
        assert!(!err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn cancelled_request_fails_without_calling_service() {
        let generator = Arc::new(MockTextGenerator::new(FIVE));
        let engine = engine(generator.clone(), Arc::new(MockInferenceService::new(1.0, 0.0)));
        let (handle, token) = cancel_pair();
        handle.cancel();
        let err = engine
            .generate_recommendations(&record(), &token)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::RecommendationFailed);
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn from_config_with_missing_reference_file_fails() {
        let config = EngineConfig {
            reference_data: Some("/nonexistent/sentinela/ref.json".into()),
            ..EngineConfig::default()
        };
        assert!(matches!(
            ClinicalAnalysisEngine::from_config(&config),
            Err(ReferenceDataError::Load(..))
        ));
    }

    #[test]
    fn from_config_uses_bundled_reference_by_default() {
        let engine = ClinicalAnalysisEngine::from_config(&EngineConfig::default()).unwrap();
        assert_eq!(engine.reference().canonical_name("Marevan"), "warfarin");
    }
}
