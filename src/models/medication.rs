use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use super::enums::MedicationStatus;

/// A prescribed dose: numeric value plus unit ("mg", "g", "mcg", ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dosage {
    pub value: f64,
    pub unit: String,
}

/// Regex for "<number><unit>" dose strings (compiled once via LazyLock).
static RE_DOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:[.,]\d+)?)\s*([a-zA-Zµ]*)$").expect("valid dose regex")
});

impl Dosage {
    pub fn new(value: f64, unit: &str) -> Self {
        Self {
            value,
            unit: unit.to_string(),
        }
    }

    /// Parse "500mg", "0,5 g", "100 mcg" or a bare number (taken as mg).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let caps = RE_DOSE.captures(trimmed)?;
        let value = caps.get(1)?.as_str().replace(',', ".").parse::<f64>().ok()?;
        let unit = caps
            .get(2)
            .map(|m| m.as_str())
            .filter(|u| !u.is_empty())
            .unwrap_or("mg");
        Some(Self::new(value, unit))
    }

    /// Dose converted to milligrams. `None` for units that are not mass-based
    /// (e.g. "UI", "mL"), which cannot be checked against mg ranges.
    pub fn to_mg(&self) -> Option<f64> {
        match self.unit.trim().to_lowercase().as_str() {
            "mg" | "milligram" | "milligrams" | "miligrama" | "miligramas" => Some(self.value),
            "g" | "gram" | "grams" | "grama" | "gramas" => Some(self.value * 1000.0),
            "mcg" | "µg" | "ug" | "microgram" | "micrograms" | "micrograma" | "microgramas" => {
                Some(self.value / 1000.0)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub name: String,
    /// Accepts `{"value":500,"unit":"mg"}`, `"500mg"` or a bare number in mg.
    /// Unparseable text is dropped rather than rejecting the record.
    #[serde(default, deserialize_with = "dosage_from_any")]
    pub dosage: Option<Dosage>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: MedicationStatus,
}

impl Medication {
    /// Active medication with only a name; other fields empty.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dosage: None,
            frequency: None,
            route: None,
            start_date: None,
            end_date: None,
            status: MedicationStatus::Active,
        }
    }

    pub fn with_dosage(mut self, value: f64, unit: &str) -> Self {
        self.dosage = Some(Dosage::new(value, unit));
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == MedicationStatus::Active
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DosageRepr {
    Structured { value: f64, unit: String },
    Number(f64),
    Text(String),
}

fn dosage_from_any<'de, D>(deserializer: D) -> Result<Option<Dosage>, D::Error>
where
    D: Deserializer<'de>,
{
    let dosage = match Option::<DosageRepr>::deserialize(deserializer)? {
        Some(DosageRepr::Structured { value, unit }) => Some(Dosage { value, unit }),
        Some(DosageRepr::Number(value)) => Some(Dosage::new(value, "mg")),
        Some(DosageRepr::Text(raw)) => Dosage::parse(&raw),
        None => None,
    };
    Ok(dosage)
}

/// Canonical form of a drug name for case-insensitive comparison.
pub fn normalize_drug_name(name: &str) -> String {
    name.trim().to_lowercase()
}
