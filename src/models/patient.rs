use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::medication::Medication;
use super::vital_sign::VitalReading;

/// Raw patient record as handed over by the hospital data layer.
///
/// Every field is optional or defaults to empty: partial clinical data is
/// expected and must never block analysis. Defaulting happens in
/// `ClinicalContextBuilder`, not at the call sites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientRecord {
    pub id: Option<String>,
    pub personal_info: Option<PersonalInfo>,
    pub diagnoses: Vec<String>,
    /// Risk label recorded by staff ("Alto", "Medium", ...), if any.
    pub risk_level: Option<String>,
    /// Append-only sequence of readings, expected in timestamp order.
    pub vitals: Vec<VitalReading>,
    pub medications: Vec<Medication>,
    pub procedures: Vec<String>,
    pub assessment: Option<NursingAssessment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfo {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub birth_date: Option<NaiveDate>,
}

/// Bedside nursing assessment. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NursingAssessment {
    pub mobility: Option<String>,
    pub consciousness: Option<String>,
    /// Numeric pain scale, nominally 0–10.
    pub pain_level: Option<i32>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
}
