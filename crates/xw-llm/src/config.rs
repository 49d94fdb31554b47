//! Completion client configuration.

use serde::Deserialize;
use std::time::Duration;

/// Settings for the remote completion endpoint and the retry policy around it.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Full chat-completion endpoint URL of an OpenAI-compatible API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Bearer token; empty means no `Authorization` header.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff base delay in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Answer from the offline keyword table instead of the network.
    #[serde(default)]
    pub use_mock: bool,
}

fn default_api_url() -> String {
    "https://api.deepseek.com/v1/chat/completions".into()
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            model: default_model(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            use_mock: false,
        }
    }
}

impl ClientConfig {
    /// Offline configuration with the keyword mock enabled.
    pub fn mock() -> Self {
        Self {
            use_mock: true,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
