//! Command shell configuration, loadable from TOML.

use serde::Deserialize;
use xw_nlp::PipelineConfig;

use crate::error::RouterResult;

/// Environment variable that forces the offline completion mock.
pub const USE_MOCK_ENV: &str = "USE_MOCK_LLM";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Game context the shell starts in.
    #[serde(default = "default_context")]
    pub default_context: String,
    /// Routed inputs kept for NLP snapshots.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Pending input lines before the reader waits.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_context() -> String {
    "exploration".into()
}

fn default_history_len() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_context: default_context(),
            history_len: default_history_len(),
            queue_capacity: default_queue_capacity(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> RouterResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate TOML config; a bad `[pipeline]` table is fatal here.
    pub fn from_toml(contents: &str) -> RouterResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Apply `USE_MOCK_LLM` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_mock_override(std::env::var(USE_MOCK_ENV).ok().as_deref());
    }

    /// `true` or `1` (any case) turns mock mode on; anything else leaves it.
    pub fn apply_mock_override(&mut self, value: Option<&str>) {
        if let Some(value) = value
            && matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
        {
            tracing::info!("{USE_MOCK_ENV} set, completion mock enabled");
            self.pipeline.use_mock = true;
        }
    }
}
