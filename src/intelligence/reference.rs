use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{normalize_drug_name, RiskCategory};

use super::types::ReferenceDataError;

/// Reference tables bundled with the crate.
const BUNDLED_REFERENCE_JSON: &str = include_str!("../../resources/clinical_reference.json");

/// Local/brand name to generic name mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationAlias {
    pub alias: String,
    pub generic: String,
}

/// Known dangerous medication pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRule {
    pub drug_a: String,
    pub drug_b: String,
    pub description: String,
}

/// Alert raised when a patient has at least one drug from each of two groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRule {
    pub group_a: String,
    pub group_b: String,
    pub alert: String,
}

/// Recommended single-dose range in milligrams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseRange {
    pub drug: String,
    pub min_mg: f64,
    pub max_mg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTag {
    pub keyword: String,
    pub tag: String,
}

/// On-disk shape of the reference file.
#[derive(Debug, Deserialize)]
struct ReferenceFile {
    #[serde(default)]
    aliases: Vec<MedicationAlias>,
    interactions: Vec<InteractionRule>,
    risk_groups: HashMap<String, Vec<String>>,
    #[serde(default)]
    group_rules: Vec<GroupRule>,
    #[serde(default)]
    dose_ranges: Vec<DoseRange>,
    high_risk_diagnoses: Vec<String>,
    high_risk_procedures: Vec<String>,
    #[serde(default)]
    mitigations: HashMap<String, Vec<String>>,
    #[serde(default)]
    special_needs_keywords: Vec<KeywordTag>,
}

/// Immutable clinical lookup tables, injected into every analysis component.
///
/// All drug names are stored in canonical (generic, lowercased) form.
#[derive(Debug, Clone)]
pub struct ClinicalReferenceData {
    aliases: HashMap<String, String>,
    interactions: HashMap<(String, String), String>,
    risk_groups: HashMap<String, HashSet<String>>,
    group_rules: Vec<GroupRule>,
    dose_ranges: HashMap<String, DoseRange>,
    high_risk_diagnoses: Vec<String>,
    high_risk_procedures: Vec<String>,
    mitigations: HashMap<RiskCategory, Vec<String>>,
    special_needs_keywords: Vec<KeywordTag>,
}

/// Order-independent key for a medication pair.
fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl ClinicalReferenceData {
    /// Reference data compiled into the crate.
    pub fn bundled() -> Result<Self, ReferenceDataError> {
        Self::from_json(BUNDLED_REFERENCE_JSON)
    }

    /// Load reference data from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ReferenceDataError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ReferenceDataError::Load(path.display().to_string(), e.to_string())
        })?;
        let data = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            interactions = data.interactions.len(),
            dose_ranges = data.dose_ranges.len(),
            "Clinical reference data loaded"
        );
        Ok(data)
    }

    pub fn from_json(json: &str) -> Result<Self, ReferenceDataError> {
        let file: ReferenceFile =
            serde_json::from_str(json).map_err(|e| ReferenceDataError::Parse(e.to_string()))?;
        Self::from_file(file)
    }

    fn from_file(file: ReferenceFile) -> Result<Self, ReferenceDataError> {
        let aliases: HashMap<String, String> = file
            .aliases
            .into_iter()
            .map(|a| (normalize_drug_name(&a.alias), normalize_drug_name(&a.generic)))
            .collect();
        let canonical = |name: &str| {
            let normalized = normalize_drug_name(name);
            aliases.get(&normalized).cloned().unwrap_or(normalized)
        };

        let mut interactions = HashMap::new();
        for rule in file.interactions {
            let a = canonical(&rule.drug_a);
            let b = canonical(&rule.drug_b);
            if a == b {
                return Err(ReferenceDataError::Invalid(format!(
                    "interaction pairs {a} with itself"
                )));
            }
            interactions.insert(pair_key(&a, &b), rule.description);
        }

        let risk_groups: HashMap<String, HashSet<String>> = file
            .risk_groups
            .into_iter()
            .map(|(group, members)| (group, members.iter().map(|m| canonical(m)).collect()))
            .collect();

        for rule in &file.group_rules {
            for group in [&rule.group_a, &rule.group_b] {
                if !risk_groups.contains_key(group) {
                    return Err(ReferenceDataError::UnknownGroup(group.clone()));
                }
            }
        }

        let mut dose_ranges = HashMap::new();
        for range in file.dose_ranges {
            if range.min_mg > range.max_mg {
                return Err(ReferenceDataError::Invalid(format!(
                    "dose range for {} has min above max",
                    range.drug
                )));
            }
            dose_ranges.insert(canonical(&range.drug), range);
        }

        let mut mitigations = HashMap::new();
        for (category, actions) in file.mitigations {
            let category = RiskCategory::from_str(&category)
                .map_err(|e| ReferenceDataError::Invalid(e.to_string()))?;
            mitigations.insert(category, actions);
        }

        let lowered = |terms: Vec<String>| -> Vec<String> {
            terms.iter().map(|t| t.trim().to_lowercase()).collect()
        };

        Ok(Self {
            interactions,
            risk_groups,
            group_rules: file.group_rules,
            dose_ranges,
            high_risk_diagnoses: lowered(file.high_risk_diagnoses),
            high_risk_procedures: lowered(file.high_risk_procedures),
            mitigations,
            special_needs_keywords: file
                .special_needs_keywords
                .into_iter()
                .map(|k| KeywordTag {
                    keyword: k.keyword.to_lowercase(),
                    tag: k.tag,
                })
                .collect(),
            aliases,
        })
    }

    /// Canonical generic name for a drug as written on the prescription.
    pub fn canonical_name(&self, name: &str) -> String {
        let normalized = normalize_drug_name(name);
        self.aliases.get(&normalized).cloned().unwrap_or(normalized)
    }

    /// Description of a known interaction between two canonical names, either order.
    pub fn interaction(&self, a: &str, b: &str) -> Option<&str> {
        self.interactions.get(&pair_key(a, b)).map(String::as_str)
    }

    /// Every known interaction as (drug, drug, description), canonical names.
    pub fn interaction_pairs(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.interactions
            .iter()
            .map(|((a, b), description)| (a.as_str(), b.as_str(), description.as_str()))
    }

    pub fn is_in_group(&self, group: &str, canonical: &str) -> bool {
        self.risk_groups
            .get(group)
            .is_some_and(|members| members.contains(canonical))
    }

    pub fn group_rules(&self) -> &[GroupRule] {
        &self.group_rules
    }

    pub fn dose_range(&self, canonical: &str) -> Option<&DoseRange> {
        self.dose_ranges.get(canonical)
    }

    /// First high-risk condition contained in the diagnosis text, if any.
    pub fn high_risk_diagnosis_match(&self, diagnosis: &str) -> Option<&str> {
        let lower = diagnosis.to_lowercase();
        self.high_risk_diagnoses
            .iter()
            .find(|term| lower.contains(term.as_str()))
            .map(String::as_str)
    }

    /// First high-risk procedure contained in the procedure text, if any.
    pub fn high_risk_procedure_match(&self, procedure: &str) -> Option<&str> {
        let lower = procedure.to_lowercase();
        self.high_risk_procedures
            .iter()
            .find(|term| lower.contains(term.as_str()))
            .map(String::as_str)
    }

    pub fn mitigations(&self, category: RiskCategory) -> &[String] {
        self.mitigations
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Special-needs tags whose keyword appears in the diagnosis text.
    pub fn special_needs_for(&self, diagnosis: &str) -> Vec<&str> {
        let lower = diagnosis.to_lowercase();
        self.special_needs_keywords
            .iter()
            .filter(|k| lower.contains(k.keyword.as_str()))
            .map(|k| k.tag.as_str())
            .collect()
    }
}
