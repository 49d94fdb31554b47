//! Pipeline configuration.
//!
//! Read once at construction and validated before anything else is built.
//! Every field has a serde default so partial TOML tables work.

use serde::Deserialize;
use std::time::Duration;
use xw_flow::{BatchConfig, TaskPool};
use xw_llm::ClientConfig;

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Total completion attempts per request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Result cache capacity.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Raw messages kept in the sliding window.
    #[serde(default = "default_context_window_size")]
    pub context_window_size: usize,
    /// Backlog size that triggers summarization.
    #[serde(default = "default_summarization_threshold")]
    pub summarization_threshold: usize,
    /// Memory blocks kept before the oldest is evicted.
    #[serde(default = "default_max_memory_blocks")]
    pub max_memory_blocks: usize,
    /// Answer from the offline keyword table.
    #[serde(default)]
    pub use_mock: bool,
    /// Per-attempt timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,

    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Estimated backlog tokens that trigger summarization.
    #[serde(default = "default_summarization_token_threshold")]
    pub summarization_token_threshold: usize,
    /// Rendered-context size above which a warning is logged.
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: usize,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub pool: PoolSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_quota")]
    pub quota: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default)]
    pub burst: usize,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Upper bound on one batch, and on a caller waiting for its result.
    #[serde(default = "default_batch_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_max_retries() -> u32 {
    3
}
fn default_cache_size() -> usize {
    128
}
fn default_context_window_size() -> usize {
    20
}
fn default_summarization_threshold() -> usize {
    30
}
fn default_max_memory_blocks() -> usize {
    10
}
fn default_request_timeout_secs() -> f64 {
    30.0
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_api_url() -> String {
    "https://api.deepseek.com/v1/chat/completions".into()
}
fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".into()
}
fn default_max_tokens() -> u32 {
    256
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8_000
}
fn default_summarization_token_threshold() -> usize {
    3_000
}
fn default_context_token_budget() -> usize {
    3_500
}
fn default_quota() -> usize {
    20
}
fn default_window_secs() -> u64 {
    60
}
fn default_acquire_timeout_secs() -> u64 {
    5
}
fn default_batch_size() -> usize {
    8
}
fn default_flush_interval_ms() -> u64 {
    50
}
fn default_max_concurrent() -> usize {
    2
}
fn default_batch_timeout_ms() -> u64 {
    120_000
}
fn default_max_workers() -> usize {
    5
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            quota: default_quota(),
            window_secs: default_window_secs(),
            burst: 0,
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            max_concurrent: default_max_concurrent(),
            timeout_ms: default_batch_timeout_ms(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            cache_size: default_cache_size(),
            context_window_size: default_context_window_size(),
            summarization_threshold: default_summarization_threshold(),
            max_memory_blocks: default_max_memory_blocks(),
            use_mock: false,
            request_timeout_secs: default_request_timeout_secs(),
            model: default_model(),
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            summarization_token_threshold: default_summarization_token_threshold(),
            context_token_budget: default_context_token_budget(),
            rate_limit: RateLimitConfig::default(),
            batch: BatchSettings::default(),
            pool: PoolSettings::default(),
        }
    }
}

/// Longest accepted per-attempt timeout.
pub const MAX_REQUEST_TIMEOUT_SECS: f64 = 3_600.0;

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

impl PipelineConfig {
    /// Offline configuration with the keyword mock enabled.
    pub fn mock() -> Self {
        Self {
            use_mock: true,
            ..Self::default()
        }
    }

    /// Reject values no pipeline can run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries == 0 {
            return Err(invalid("max_retries", "must be at least 1"));
        }
        if self.cache_size == 0 {
            return Err(invalid("cache_size", "must be at least 1"));
        }
        if self.context_window_size == 0 {
            return Err(invalid("context_window_size", "must be at least 1"));
        }
        if self.summarization_threshold == 0 {
            return Err(invalid("summarization_threshold", "must be at least 1"));
        }
        if self.max_memory_blocks == 0 {
            return Err(invalid("max_memory_blocks", "must be at least 1"));
        }
        if !(self.request_timeout_secs.is_finite() && self.request_timeout_secs > 0.0) {
            return Err(invalid("request_timeout_secs", "must be positive"));
        }
        if self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            return Err(invalid(
                "request_timeout_secs",
                &format!("must be at most {MAX_REQUEST_TIMEOUT_SECS} seconds"),
            ));
        }
        if self.rate_limit.quota == 0 {
            return Err(invalid("rate_limit.quota", "must be at least 1"));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(invalid("rate_limit.window_secs", "must be at least 1"));
        }
        if self.batch.size == 0 {
            return Err(invalid("batch.size", "must be at least 1"));
        }
        if self.batch.max_concurrent == 0 {
            return Err(invalid("batch.max_concurrent", "must be at least 1"));
        }
        if self.batch.timeout_ms == 0 {
            return Err(invalid("batch.timeout_ms", "must be at least 1"));
        }
        if self.pool.max_workers == 0 {
            return Err(invalid("pool.max_workers", "must be at least 1"));
        }
        Ok(())
    }

    /// Per-attempt timeout. Values `validate` rejects map to the default.
    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_secs)
            .ok()
            .filter(|t| !t.is_zero() && t.as_secs_f64() <= MAX_REQUEST_TIMEOUT_SECS)
            .unwrap_or_else(|| Duration::from_secs_f64(default_request_timeout_secs()))
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch.timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.rate_limit.acquire_timeout_secs)
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            size: self.batch.size,
            flush_interval: Duration::from_millis(self.batch.flush_interval_ms),
            max_concurrent: self.batch.max_concurrent,
            timeout: self.batch_timeout(),
        }
    }

    /// Worker pool for spawned parses, sized by `pool.max_workers`.
    pub fn open_pool(&self) -> TaskPool {
        TaskPool::open(self.pool.max_workers)
    }

    /// Completion client settings, with the given API key.
    pub fn client_config(&self, api_key: String) -> ClientConfig {
        ClientConfig {
            api_url: self.api_url.clone(),
            api_key,
            model: self.model.clone(),
            timeout_ms: self.request_timeout().as_millis() as u64,
            max_attempts: self.max_retries,
            backoff_base_ms: self.backoff_base_ms,
            backoff_max_ms: self.backoff_max_ms,
            use_mock: self.use_mock,
        }
    }

    /// Resolve the API key from the environment. Mock mode needs none.
    pub fn resolve_api_key(&self) -> ConfigResult<String> {
        if self.use_mock {
            return Ok(String::new());
        }
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingApiKey {
                env: self.api_key_env.clone(),
            }),
        }
    }
}
