//! NLP pipeline error types.

use thiserror::Error;
use xw_llm::CompletionError;

/// Fatal configuration problems, detected before any request is accepted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("API key missing: set {env} or enable use_mock")]
    MissingApiKey { env: String },

    #[error("failed to build completion client: {0}")]
    Client(#[from] CompletionError),
}

/// Failures on the remote path. The pipeline converts every one of these
/// into a fallback parse; they never reach the router.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("remote confidence {confidence} not above fallback level")]
    LowConfidence { confidence: f64 },

    #[error("no rate-limit permit within {timeout_ms}ms")]
    RateLimited { timeout_ms: u64 },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
