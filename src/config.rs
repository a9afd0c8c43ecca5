use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::outcome::FeatureDefaults;

/// Application-level constants
pub const APP_NAME: &str = "Sentinela";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory: ~/Sentinela/, falling back to the
/// working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

const REFERENCE_DATA_FILE: &str = "clinical_reference.json";

/// Default location of an operator-supplied reference data file.
pub fn reference_data_path() -> PathBuf {
    app_data_dir().join(REFERENCE_DATA_FILE)
}

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "sentinela=debug,warn"
    } else {
        "sentinela=info,warn"
    }
}

/// Engine settings. Defaults suit a local Ollama; every field can be
/// overridden from `SENTINELA_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ollama_url: String,
    pub model: String,
    pub inference_url: String,
    pub generation_timeout_secs: u64,
    pub inference_timeout_secs: u64,
    pub cache_capacity: usize,
    /// `None` keeps entries until evicted.
    pub cache_max_age_secs: Option<u64>,
    /// Reference tables file. When `None`, see [`EngineConfig::reference_data_file`].
    pub reference_data: Option<PathBuf>,
    pub feature_defaults: FeatureDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".into(),
            model: "medgemma".into(),
            inference_url: "http://localhost:8500".into(),
            generation_timeout_secs: 120,
            inference_timeout_secs: 30,
            cache_capacity: 256,
            cache_max_age_secs: Some(24 * 60 * 60),
            reference_data: None,
            feature_defaults: FeatureDefaults::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`. Unparseable numbers are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("SENTINELA_OLLAMA_URL") {
            config.ollama_url = v;
        }
        if let Some(v) = lookup("SENTINELA_MODEL") {
            config.model = v;
        }
        if let Some(v) = lookup("SENTINELA_INFERENCE_URL") {
            config.inference_url = v;
        }
        if let Some(v) = parse_var(&lookup, "SENTINELA_GENERATION_TIMEOUT_SECS") {
            config.generation_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "SENTINELA_INFERENCE_TIMEOUT_SECS") {
            config.inference_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "SENTINELA_CACHE_CAPACITY") {
            config.cache_capacity = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "SENTINELA_CACHE_MAX_AGE_SECS") {
            // 0 disables expiry
            config.cache_max_age_secs = (v > 0).then_some(v);
        }
        if let Some(v) = lookup("SENTINELA_REFERENCE_DATA") {
            config.reference_data = Some(PathBuf::from(v));
        }

        config
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn cache_max_age(&self) -> Option<Duration> {
        self.cache_max_age_secs.map(Duration::from_secs)
    }

    /// Reference file to load: the configured path, else
    /// [`reference_data_path`] when that file exists. `None` selects the
    /// bundled tables.
    pub fn reference_data_file(&self) -> Option<PathBuf> {
        self.reference_data_file_in(&app_data_dir())
    }

    fn reference_data_file_in(&self, data_dir: &Path) -> Option<PathBuf> {
        if let Some(path) = &self.reference_data {
            return Some(path.clone());
        }
        let default = data_dir.join(REFERENCE_DATA_FILE);
        default.is_file().then_some(default)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable configuration value");
            None
        }
    }
}
