pub mod config;
pub mod models;
pub mod intelligence; // Context, trends, interactions, risk scoring
pub mod pipeline; // Recommendations and outcome prediction

use tracing_subscriber::EnvFilter;

pub use config::EngineConfig;
pub use intelligence::{ClinicalAnalysisEngine, EngineError, PatientAnalysis};
pub use models::PatientRecord;
pub use pipeline::inference::{cancel_pair, CancelHandle, CancelToken};

/// Install the fmt subscriber. `RUST_LOG` wins over the built-in filter.
/// A second call is a no-op so hosts that already installed a subscriber
/// keep theirs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("Sentinela starting v{}", config::APP_VERSION);
}
