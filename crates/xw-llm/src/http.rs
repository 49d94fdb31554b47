//! HTTP backend for OpenAI-compatible chat-completion APIs.
//!
//! Posts to the configured endpoint and returns the first choice's
//! message content. Status codes are classified into retryable server errors
//! and terminal rejections; the retry loop itself lives in `CompletionClient`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use xw_protocol::{ChatMessage, CompletionRequest};

use crate::backend::CompletionBackend;
use crate::config::ClientConfig;
use crate::error::{CompletionError, CompletionResult};

/// Chat completion request body.
#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Chat completion response (only fields we need).
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for a remote chat-completion endpoint.
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout_ms: u64,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> CompletionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    fn classify(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            CompletionError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn send(&self, request: &CompletionRequest) -> CompletionResult<String> {
        let body = ChatBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "completion endpoint returned non-200");
            return Err(CompletionError::from_status(status.as_u16(), message));
        }

        let text = response.text().await.map_err(|e| self.classify(e))?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| CompletionError::Malformed(format!("invalid response body: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(CompletionError::Malformed("empty completion".into()));
        }
        Ok(content)
    }

    fn name(&self) -> &str {
        "http"
    }
}
