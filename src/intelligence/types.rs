use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AggregateTrend, DosageDeviation, Medication, RiskCategory, RiskLevel, TrendLabel,
    VitalChannel, VitalReading,
};
use crate::pipeline::outcome::PredictedOutcomes;

// ---------------------------------------------------------------------------
// ClinicalContext
// ---------------------------------------------------------------------------

/// Per-request snapshot of a patient, rebuilt on every analysis. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalContext {
    /// `None` when neither an age nor a birth date was recorded.
    pub age: Option<u32>,
    pub diagnoses: Vec<String>,
    pub risk_level: RiskLevel,
    pub latest_vitals: Option<VitalReading>,
    pub medications: Vec<Medication>,
    pub procedures: Vec<String>,
    pub care_status: CareStatus,
}

/// Nursing-level status block derived from the assessment and latest vitals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareStatus {
    pub mobility: String,
    pub consciousness: String,
    /// 0–10.
    pub pain_level: u8,
    pub nutrition: String,
    pub respiratory: String,
    pub special_needs: Vec<String>,
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTrend {
    pub channel: VitalChannel,
    pub label: TrendLabel,
    /// Mean of the first (up to) three values.
    pub baseline_mean: Option<f64>,
    /// Mean of the last (up to) three values.
    pub recent_mean: Option<f64>,
}

impl ChannelTrend {
    pub fn insufficient(channel: VitalChannel) -> Self {
        Self {
            channel,
            label: TrendLabel::InsufficientData,
            baseline_mean: None,
            recent_mean: None,
        }
    }

    /// Trend moves in the direction that signals deterioration for this channel.
    pub fn is_adverse(&self) -> bool {
        match self.label {
            TrendLabel::Increasing => self.channel.rise_is_adverse(),
            TrendLabel::Decreasing => !self.channel.rise_is_adverse(),
            _ => false,
        }
    }

    /// Trend moves in the direction that signals improvement for this channel.
    pub fn is_favorable(&self) -> bool {
        match self.label {
            TrendLabel::Increasing => !self.channel.rise_is_adverse(),
            TrendLabel::Decreasing => self.channel.rise_is_adverse(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub channels: Vec<ChannelTrend>,
    pub aggregate: AggregateTrend,
}

impl TrendReport {
    pub fn label(&self, channel: VitalChannel) -> TrendLabel {
        self.channels
            .iter()
            .find(|c| c.channel == channel)
            .map(|c| c.label)
            .unwrap_or(TrendLabel::InsufficientData)
    }
}

// ---------------------------------------------------------------------------
// Medication checks
// ---------------------------------------------------------------------------

/// A known dangerous pair found in the patient's medication list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionFinding {
    pub medications: (String, String),
    pub description: String,
}

impl InteractionFinding {
    pub fn involves(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.medications.0.to_lowercase() == lower || self.medications.1.to_lowercase() == lower
    }
}

/// Risk-class combination (e.g. anticoagulant + anti-inflammatory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAlert {
    pub groups: (String, String),
    pub medications: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosageIssue {
    pub medication: String,
    pub dose_mg: f64,
    pub min_mg: f64,
    pub max_mg: f64,
    pub deviation: DosageDeviation,
    pub suggestion: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionReport {
    pub findings: Vec<InteractionFinding>,
    pub group_alerts: Vec<GroupAlert>,
    pub dosage_issues: Vec<DosageIssue>,
}

impl InteractionReport {
    pub fn suggestions(&self) -> Vec<&str> {
        self.dosage_issues
            .iter()
            .map(|i| i.suggestion.as_str())
            .collect()
    }

    pub fn is_clear(&self) -> bool {
        self.findings.is_empty() && self.group_alerts.is_empty() && self.dosage_issues.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub category: RiskCategory,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub factors: Vec<RiskFactor>,
    /// Saturating additive score in [0, 1]; not a probability.
    pub score: f64,
    pub level: RiskLevel,
    pub mitigations: Vec<String>,
}

impl RiskAssessment {
    pub fn count(&self, category: RiskCategory) -> usize {
        self.factors.iter().filter(|f| f.category == category).count()
    }
}

// ---------------------------------------------------------------------------
// Aggregated results
// ---------------------------------------------------------------------------

/// Deterministic analysis of one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalAnalysis {
    pub context: ClinicalContext,
    pub trends: TrendReport,
    pub interactions: InteractionReport,
}

/// Caller-facing result of `analyze_patient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientAnalysis {
    /// Correlates log lines of one analysis run.
    pub id: Uuid,
    pub risk_analysis: RiskAssessment,
    pub analysis: ClinicalAnalysis,
    pub predicted_outcomes: PredictedOutcomes,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ReferenceDataError {
    #[error("Failed to read reference data at {0}: {1}")]
    Load(String, String),

    #[error("Failed to parse reference data: {0}")]
    Parse(String),

    #[error("Group rule references unknown risk group: {0}")]
    UnknownGroup(String),

    #[error("Invalid reference data: {0}")]
    Invalid(String),
}

/// Caller-facing failure. Messages stay generic; the underlying cause is
/// logged where it happens and never exposed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Failed to analyze patient")]
    AnalysisFailed,

    #[error("Failed to generate recommendations")]
    RecommendationFailed,
}
