//! Normalizes raw patient records into `ClinicalContext` snapshots.
//!
//! Missing data is never an error. Defaulting rules:
//! - no age and no birth date → age unknown (`None`)
//! - no risk label (or an unrecognized one) → `Low`, which the engine then
//!   replaces with the computed risk level
//! - no vitals → no latest-vitals block, respiratory status "Não Avaliado"
//! - no mobility / consciousness → "Não Avaliado"
//! - no pain score → 0
//! - no weight or height → nutritional status "Não Avaliado"

use chrono::{Datelike, Local, NaiveDate};

use crate::models::{NursingAssessment, PatientRecord, PersonalInfo, RiskLevel, VitalReading};

use super::reference::ClinicalReferenceData;
use super::types::{CareStatus, ClinicalContext};

pub const NOT_ASSESSED: &str = "Não Avaliado";

/// Pain score at or above which the patient is tagged for intensive pain control.
const SEVERE_PAIN_THRESHOLD: u8 = 7;

const REDUCED_MOBILITY_KEYWORDS: &[&str] = &[
    "acamad",
    "restrit",
    "cadeira de rodas",
    "dependente",
    "imóvel",
    "imovel",
    "bedridden",
    "wheelchair",
];

const ALTERED_CONSCIOUSNESS_KEYWORDS: &[&str] = &[
    "confus",
    "sonolent",
    "torpor",
    "coma",
    "desorientad",
    "letárgic",
    "letargic",
    "agitad",
];

pub struct ClinicalContextBuilder<'a> {
    reference: &'a ClinicalReferenceData,
    today: NaiveDate,
}

impl<'a> ClinicalContextBuilder<'a> {
    pub fn new(reference: &'a ClinicalReferenceData) -> Self {
        Self {
            reference,
            today: Local::now().date_naive(),
        }
    }

    /// Fix the date used to derive age from a birth date.
    pub fn with_reference_date(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn build(&self, record: &PatientRecord) -> ClinicalContext {
        let latest = latest_vitals(&record.vitals);
        let care_status = self.care_status(record, latest.as_ref());

        ClinicalContext {
            age: record
                .personal_info
                .as_ref()
                .and_then(|info| resolve_age(info, self.today)),
            diagnoses: clean_list(&record.diagnoses),
            risk_level: record
                .risk_level
                .as_deref()
                .and_then(RiskLevel::parse_label)
                .unwrap_or_default(),
            latest_vitals: latest,
            medications: record.medications.clone(),
            procedures: clean_list(&record.procedures),
            care_status,
        }
    }

    pub fn care_status(
        &self,
        record: &PatientRecord,
        latest: Option<&VitalReading>,
    ) -> CareStatus {
        let assessment = record.assessment.as_ref();
        let mut status = CareStatus {
            mobility: mobility_status(assessment),
            consciousness: consciousness_level(assessment),
            pain_level: pain_level(assessment),
            nutrition: nutritional_status(assessment),
            respiratory: respiratory_status(latest),
            special_needs: Vec::new(),
        };
        status.special_needs = special_needs(&status, &record.diagnoses, self.reference);
        status
    }
}

/// Explicit age wins over birth date.
pub fn resolve_age(info: &PersonalInfo, today: NaiveDate) -> Option<u32> {
    if let Some(age) = info.age {
        return Some(age);
    }
    let birth = info.birth_date?;
    if birth > today {
        return None;
    }
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Most recent reading by timestamp. Ties resolve to the later entry.
pub fn latest_vitals(vitals: &[VitalReading]) -> Option<VitalReading> {
    vitals
        .iter()
        .enumerate()
        .max_by_key(|(idx, v)| (v.timestamp, *idx))
        .map(|(_, v)| v.clone())
}

fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty_or_default(value: Option<&String>) -> String {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| NOT_ASSESSED.to_string())
}

pub fn mobility_status(assessment: Option<&NursingAssessment>) -> String {
    non_empty_or_default(assessment.and_then(|a| a.mobility.as_ref()))
}

pub fn consciousness_level(assessment: Option<&NursingAssessment>) -> String {
    non_empty_or_default(assessment.and_then(|a| a.consciousness.as_ref()))
}

/// Pain on the 0–10 scale; out-of-range entries are clamped.
pub fn pain_level(assessment: Option<&NursingAssessment>) -> u8 {
    assessment
        .and_then(|a| a.pain_level)
        .map(|p| p.clamp(0, 10) as u8)
        .unwrap_or(0)
}

pub fn body_mass_index(weight_kg: f64, height_cm: f64) -> Option<f64> {
    if weight_kg <= 0.0 || height_cm <= 0.0 {
        return None;
    }
    let height_m = height_cm / 100.0;
    Some(weight_kg / (height_m * height_m))
}

pub fn nutritional_status(assessment: Option<&NursingAssessment>) -> String {
    let bmi = assessment.and_then(|a| match (a.weight_kg, a.height_cm) {
        (Some(w), Some(h)) => body_mass_index(w, h),
        _ => None,
    });
    match bmi {
        None => NOT_ASSESSED,
        Some(b) if b < 18.5 => "Baixo Peso",
        Some(b) if b < 25.0 => "Normal",
        Some(b) if b < 30.0 => "Sobrepeso",
        Some(_) => "Obesidade",
    }
    .to_string()
}

/// Respiratory status from the latest SpO2 and respiratory rate.
pub fn respiratory_status(latest: Option<&VitalReading>) -> String {
    let (spo2, rate) = match latest {
        Some(v) => (v.oxygen_saturation, v.respiratory_rate),
        None => (None, None),
    };
    if spo2.is_none() && rate.is_none() {
        return NOT_ASSESSED.to_string();
    }

    let failing = spo2.is_some_and(|s| s < 90.0) || rate.is_some_and(|r| r > 30.0);
    let altered = spo2.is_some_and(|s| s < 95.0) || rate.is_some_and(|r| !(12.0..=20.0).contains(&r));

    if failing {
        "Insuficiência Respiratória"
    } else if altered {
        "Alterado"
    } else {
        "Normal"
    }
    .to_string()
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

/// Special-needs tags, deduplicated in first-seen order.
pub fn special_needs(
    status: &CareStatus,
    diagnoses: &[String],
    reference: &ClinicalReferenceData,
) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push = |tag: &str| {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    };

    if contains_any(&status.mobility, REDUCED_MOBILITY_KEYWORDS) {
        push("Mobilidade Reduzida");
    }
    if contains_any(&status.consciousness, ALTERED_CONSCIOUSNESS_KEYWORDS) {
        push("Alteração do Nível de Consciência");
    }
    if status.pain_level >= SEVERE_PAIN_THRESHOLD {
        push("Controle de Dor Intensa");
    }
    if matches!(status.nutrition.as_str(), "Baixo Peso" | "Obesidade") {
        push("Suporte Nutricional");
    }
    if matches!(
        status.respiratory.as_str(),
        "Alterado" | "Insuficiência Respiratória"
    ) {
        push("Suporte Respiratório");
    }
    for diagnosis in diagnoses {
        for tag in reference.special_needs_for(diagnosis) {
            push(tag);
        }
    }

    tags
}
