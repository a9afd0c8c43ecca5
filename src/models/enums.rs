use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a label does not match any variant of a string-backed enum.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid value for {field}: {value}")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(MedicationStatus {
    Active => "active",
    Suspended => "suspended",
    Completed => "completed",
});

impl Default for MedicationStatus {
    fn default() -> Self {
        Self::Active
    }
}

str_enum!(RiskLevel {
    Low => "Low",
    Medium => "Medium",
    High => "High",
});

/// Score above which a patient is labelled High.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;
/// Score above which a patient is labelled Medium.
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.4;

impl RiskLevel {
    /// Three-tier thresholding shared by the risk scorer and the outcome predictor.
    /// Both thresholds are exclusive: 0.7 is Medium, 0.4 is Low.
    pub fn from_score(score: f64) -> Self {
        if score > HIGH_RISK_THRESHOLD {
            Self::High
        } else if score > MEDIUM_RISK_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Parse a free-text risk label as entered by staff (English or Portuguese).
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "high" | "alto" | "alta" | "elevado" => Some(Self::High),
            "medium" | "médio" | "medio" | "média" | "moderado" | "moderada" => {
                Some(Self::Medium)
            }
            "low" | "baixo" | "baixa" => Some(Self::Low),
            _ => None,
        }
    }

    /// Portuguese display label.
    pub fn label_pt(&self) -> &'static str {
        match self {
            Self::Low => "Baixo",
            Self::Medium => "Médio",
            Self::High => "Alto",
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Low
    }
}

str_enum!(RiskCategory {
    Age => "age",
    Diagnosis => "diagnosis",
    Procedure => "procedure",
});

str_enum!(TrendLabel {
    Increasing => "increasing",
    Decreasing => "decreasing",
    Stable => "stable",
    InsufficientData => "insufficient-data",
});

str_enum!(AggregateTrend {
    Stable => "stable",
    Deteriorating => "deteriorating",
    Improving => "improving",
    Variable => "variable",
    InsufficientData => "insufficient-data",
});

str_enum!(RecoveryTrajectory {
    Favorable => "favorable",
    Unfavorable => "unfavorable",
    Stable => "stable",
});

str_enum!(DosageDeviation {
    BelowRecommended => "below_recommended",
    AboveRecommended => "above_recommended",
});
