use crate::models::{RiskCategory, RiskLevel};

use super::reference::ClinicalReferenceData;
use super::types::{ClinicalContext, RiskAssessment, RiskFactor};

const AGE_WEIGHT: f64 = 0.3;
const DIAGNOSIS_WEIGHT: f64 = 0.4;
const PROCEDURE_WEIGHT: f64 = 0.3;

const ELDERLY_AGE: u32 = 65;
const VERY_ELDERLY_AGE: u32 = 80;
const PEDIATRIC_AGE: u32 = 12;

/// Weighted age / diagnosis / procedure risk heuristic.
///
/// The score is an additive saturating sum of flag counts, clamped to 1.0.
/// It is not normalized and is not a probability.
pub struct RiskScorer<'a> {
    reference: &'a ClinicalReferenceData,
}

impl<'a> RiskScorer<'a> {
    pub fn new(reference: &'a ClinicalReferenceData) -> Self {
        Self { reference }
    }

    pub fn assess(&self, context: &ClinicalContext) -> RiskAssessment {
        let mut factors = age_factors(context.age);
        factors.extend(self.diagnosis_factors(&context.diagnoses));
        factors.extend(self.procedure_factors(&context.procedures));

        let count = |category| factors.iter().filter(|f| f.category == category).count() as f64;
        let score = weighted_score(
            count(RiskCategory::Age),
            count(RiskCategory::Diagnosis),
            count(RiskCategory::Procedure),
        );

        RiskAssessment {
            mitigations: self.mitigations(&factors),
            level: RiskLevel::from_score(score),
            score,
            factors,
        }
    }

    fn diagnosis_factors(&self, diagnoses: &[String]) -> Vec<RiskFactor> {
        diagnoses
            .iter()
            .filter_map(|d| {
                self.reference
                    .high_risk_diagnosis_match(d)
                    .map(|_| RiskFactor {
                        category: RiskCategory::Diagnosis,
                        description: format!("Diagnóstico de alto risco: {d}"),
                    })
            })
            .collect()
    }

    fn procedure_factors(&self, procedures: &[String]) -> Vec<RiskFactor> {
        procedures
            .iter()
            .filter_map(|p| {
                self.reference
                    .high_risk_procedure_match(p)
                    .map(|_| RiskFactor {
                        category: RiskCategory::Procedure,
                        description: format!("Procedimento de alto risco: {p}"),
                    })
            })
            .collect()
    }

    /// Actions for every flagged category, in factor order, without repeats.
    fn mitigations(&self, factors: &[RiskFactor]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for factor in factors {
            for action in self.reference.mitigations(factor.category) {
                if !out.contains(action) {
                    out.push(action.clone());
                }
            }
        }
        out
    }
}

/// Unknown age raises no flags.
fn age_factors(age: Option<u32>) -> Vec<RiskFactor> {
    let Some(age) = age else {
        return Vec::new();
    };
    let flag = |description: String| RiskFactor {
        category: RiskCategory::Age,
        description,
    };

    let mut factors = Vec::new();
    if age >= ELDERLY_AGE {
        factors.push(flag(format!("Idade avançada ({age} anos)")));
    }
    if age >= VERY_ELDERLY_AGE {
        factors.push(flag(format!("Idade muito avançada ({age} anos)")));
    }
    if age < PEDIATRIC_AGE {
        factors.push(flag(format!("Paciente pediátrico ({age} anos)")));
    }
    factors
}

/// Rounded to four decimals so that 0.3 + 0.4 lands exactly on 0.7.
pub fn weighted_score(age_flags: f64, diagnosis_flags: f64, procedure_flags: f64) -> f64 {
    let raw = age_flags * AGE_WEIGHT
        + diagnosis_flags * DIAGNOSIS_WEIGHT
        + procedure_flags * PROCEDURE_WEIGHT;
    (raw.min(1.0) * 10_000.0).round() / 10_000.0
}
