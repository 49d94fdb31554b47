//! Shared test harness for E2E integration tests.
//!
//! Wires a real `NlpPipeline` and `CommandRouter` around a recording
//! `ScriptedBackend`, so every test can see exactly how many completion
//! calls reached the backend.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use xw_llm::ScriptedBackend;
use xw_nlp::{NlpPipeline, PipelineConfig};
use xw_router::{CommandRouter, Registry, RoutedCommand};

pub const EXPLORATION: &str = "exploration";
pub const BATTLE: &str = "battle";

/// Remote configuration with millisecond backoff so retries stay fast.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        use_mock: false,
        backoff_base_ms: 1,
        backoff_max_ms: 2,
        ..PipelineConfig::default()
    }
}

/// A completion-service reply carrying one parse result.
pub fn parse_reply(command: &str, intent: &str) -> String {
    json!({
        "normalized_command": command,
        "intent": intent,
        "args": {},
        "explanation": "e2e",
    })
    .to_string()
}

/// OpenAI-style response body wrapping `content`.
pub fn chat_body(content: &str) -> Value {
    json!({
        "id": "chatcmpl-e2e",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

pub struct TestHarness {
    pub backend: Arc<ScriptedBackend>,
    pub pipeline: Arc<NlpPipeline>,
    pub router: CommandRouter,
}

impl TestHarness {
    pub fn with_config(config: PipelineConfig, backend: ScriptedBackend) -> Self {
        let backend = Arc::new(backend);
        let pipeline = Arc::new(NlpPipeline::with_backend(config, backend.clone()).unwrap());
        let router = CommandRouter::new(Registry::standard().unwrap(), 10)
            .with_delegate(pipeline.clone());
        Self {
            backend,
            pipeline,
            router,
        }
    }

    /// Remote mode over a scripted backend.
    pub fn scripted(backend: ScriptedBackend) -> Self {
        Self::with_config(fast_config(), backend)
    }

    /// Keyword mock mode; the scripted backend must never be reached.
    pub fn mock() -> Self {
        Self::with_config(PipelineConfig::mock(), ScriptedBackend::new(Vec::new()))
    }

    pub async fn route(&self, text: &str, context: &str) -> RoutedCommand {
        self.router.route(text, context).await
    }
}
