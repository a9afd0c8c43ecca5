use std::collections::HashSet;

use crate::models::{DosageDeviation, Medication};

use super::reference::ClinicalReferenceData;
use super::types::{DosageIssue, GroupAlert, InteractionFinding, InteractionReport};

/// Active medication resolved to its canonical generic name.
struct ResolvedMedication<'m> {
    canonical: String,
    medication: &'m Medication,
}

/// Checks a medication list against the pairwise interaction table, the
/// risk-group rules and the recommended dose ranges.
pub struct MedicationInteractionChecker<'a> {
    reference: &'a ClinicalReferenceData,
}

impl<'a> MedicationInteractionChecker<'a> {
    pub fn new(reference: &'a ClinicalReferenceData) -> Self {
        Self { reference }
    }

    pub fn check(&self, medications: &[Medication]) -> InteractionReport {
        let resolved = self.resolve(medications);
        InteractionReport {
            findings: self.pairwise_findings(&resolved),
            group_alerts: self.group_alerts(&resolved),
            dosage_issues: self.dosage_issues(&resolved),
        }
    }

    /// Active medications only, first occurrence of each canonical name kept.
    fn resolve<'m>(&self, medications: &'m [Medication]) -> Vec<ResolvedMedication<'m>> {
        let mut seen = HashSet::new();
        medications
            .iter()
            .filter(|m| m.is_active() && !m.name.trim().is_empty())
            .filter_map(|m| {
                let canonical = self.reference.canonical_name(&m.name);
                seen.insert(canonical.clone()).then_some(ResolvedMedication {
                    canonical,
                    medication: m,
                })
            })
            .collect()
    }

    fn pairwise_findings(&self, meds: &[ResolvedMedication<'_>]) -> Vec<InteractionFinding> {
        let mut findings = Vec::new();
        for (i, a) in meds.iter().enumerate() {
            for b in &meds[i + 1..] {
                if let Some(description) = self.reference.interaction(&a.canonical, &b.canonical)
                {
                    findings.push(InteractionFinding {
                        medications: (
                            a.medication.name.trim().to_string(),
                            b.medication.name.trim().to_string(),
                        ),
                        description: description.to_string(),
                    });
                }
            }
        }
        findings
    }

    fn group_alerts(&self, meds: &[ResolvedMedication<'_>]) -> Vec<GroupAlert> {
        let members = |group: &str| -> Vec<String> {
            meds.iter()
                .filter(|m| self.reference.is_in_group(group, &m.canonical))
                .map(|m| m.medication.name.trim().to_string())
                .collect()
        };

        self.reference
            .group_rules()
            .iter()
            .filter_map(|rule| {
                let in_a = members(&rule.group_a);
                let in_b = members(&rule.group_b);
                if in_a.is_empty() || in_b.is_empty() {
                    return None;
                }
                let mut involved = in_a;
                for name in in_b {
                    if !involved.contains(&name) {
                        involved.push(name);
                    }
                }
                Some(GroupAlert {
                    groups: (rule.group_a.clone(), rule.group_b.clone()),
                    medications: involved,
                    message: rule.alert.clone(),
                })
            })
            .collect()
    }

    fn dosage_issues(&self, meds: &[ResolvedMedication<'_>]) -> Vec<DosageIssue> {
        meds.iter()
            .filter_map(|m| {
                let range = self.reference.dose_range(&m.canonical)?;
                let dose_mg = m.medication.dosage.as_ref()?.to_mg()?;
                let name = m.medication.name.trim();
                let (deviation, suggestion) = if dose_mg < range.min_mg {
                    (
                        DosageDeviation::BelowRecommended,
                        format!(
                            "Considerar aumentar a dose de {name} (atual {} mg, faixa recomendada {}–{} mg).",
                            format_mg(dose_mg),
                            format_mg(range.min_mg),
                            format_mg(range.max_mg)
                        ),
                    )
                } else if dose_mg > range.max_mg {
                    (
                        DosageDeviation::AboveRecommended,
                        format!(
                            "Considerar reduzir a dose de {name} (atual {} mg, faixa recomendada {}–{} mg).",
                            format_mg(dose_mg),
                            format_mg(range.min_mg),
                            format_mg(range.max_mg)
                        ),
                    )
                } else {
                    return None;
                };
                Some(DosageIssue {
                    medication: name.to_string(),
                    dose_mg,
                    min_mg: range.min_mg,
                    max_mg: range.max_mg,
                    deviation,
                    suggestion,
                })
            })
            .collect()
    }
}

/// "5" rather than "5.0"; fractional doses keep up to two decimals.
fn format_mg(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        let text = format!("{value:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
