pub mod types;
pub mod reference;
pub mod context;
pub mod trends;
pub mod interactions;
pub mod risk;
pub mod engine;

pub use types::*;
pub use reference::ClinicalReferenceData;
pub use context::ClinicalContextBuilder;
pub use trends::VitalTrendAnalyzer;
pub use interactions::MedicationInteractionChecker;
pub use risk::RiskScorer;
pub use engine::ClinicalAnalysisEngine;
