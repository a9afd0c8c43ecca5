use std::collections::BTreeSet;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::intelligence::types::ClinicalContext;
use crate::models::{normalize_drug_name, RiskLevel};

/// Minimum similarity for a cached entry to serve a different context.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

const DIAGNOSIS_WEIGHT: f64 = 0.4;
const AGE_WEIGHT: f64 = 0.3;
const MEDICATION_WEIGHT: f64 = 0.3;

/// Canonical, order-independent view of the fields that key the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FingerprintFields {
    pub diagnoses: BTreeSet<String>,
    pub age: Option<u32>,
    pub risk_level: RiskLevel,
    pub medications: BTreeSet<String>,
}

impl FingerprintFields {
    pub fn from_context(context: &ClinicalContext) -> Self {
        Self {
            diagnoses: normalized_set(context.diagnoses.iter().map(String::as_str)),
            age: context.age,
            risk_level: context.risk_level,
            medications: normalized_set(context.medications.iter().map(|m| m.name.as_str())),
        }
    }

    /// Deterministic serialization; sets serialize in sorted order.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Hex SHA-256 of the canonical serialization.
    pub fn key(&self) -> String {
        format!("{:x}", Sha256::digest(self.canonical().as_bytes()))
    }
}

fn normalized_set<'a>(values: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    values
        .map(normalize_drug_name)
        .filter(|v| !v.is_empty())
        .collect()
}

/// Cache key for a context.
pub fn fingerprint(context: &ClinicalContext) -> String {
    FingerprintFields::from_context(context).key()
}

/// |A ∩ B| / |A ∪ B|. Two empty sets are identical.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// 1 − |Δage|/100, floored at 0. Both unknown counts as a match; one
/// unknown as no match.
pub fn age_similarity(a: Option<u32>, b: Option<u32>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => (1.0 - a.abs_diff(b) as f64 / 100.0).max(0.0),
        (None, None) => 1.0,
        _ => 0.0,
    }
}

/// Weighted blend of diagnosis overlap, age proximity and medication overlap.
/// Risk level does not enter the similarity; it only keys exact hits.
pub fn similarity(a: &FingerprintFields, b: &FingerprintFields) -> f64 {
    jaccard(&a.diagnoses, &b.diagnoses) * DIAGNOSIS_WEIGHT
        + age_similarity(a.age, b.age) * AGE_WEIGHT
        + jaccard(&a.medications, &b.medications) * MEDICATION_WEIGHT
}
