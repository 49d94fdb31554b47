//! Offline completion backends.
//!
//! `KeywordMock` answers from a fixed keyword table so the whole pipeline can
//! run without network access. `ScriptedBackend` replays queued results and
//! records every request for assertion in tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use xw_protocol::{CompletionRequest, Role};

use crate::backend::CompletionBackend;
use crate::error::{CompletionError, CompletionResult};

/// Requests whose first system message starts with this are answered with
/// a summary instead of a parse.
pub const SUMMARY_MARKER: &str = "你是一个对话摘要助手";

/// keyword → (normalized command, intent label). First match wins.
const KEYWORD_TABLE: &[(&str, &str, &str)] = &[
    ("探索", "探索", "action"),
    ("修炼", "修炼", "train"),
    ("背包", "打开背包", "check"),
    ("状态", "查看状态", "check"),
];

/// Deterministic keyword-to-template responder.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMock;

impl KeywordMock {
    pub fn new() -> Self {
        Self
    }

    pub fn respond(&self, request: &CompletionRequest) -> String {
        let user = request.last_user_message().unwrap_or_default();

        let wants_summary = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .is_some_and(|m| m.content.starts_with(SUMMARY_MARKER));
        if wants_summary {
            let turns = user.lines().filter(|l| !l.trim().is_empty()).count();
            return format!("Mock模式：玩家进行了{turns}次交互。");
        }

        let (command, intent, label) = KEYWORD_TABLE
            .iter()
            .find(|(keyword, _, _)| user.contains(keyword))
            .map(|(keyword, command, intent)| (*command, *intent, *keyword))
            .unwrap_or(("未知", "unknown", "未知"));

        serde_json::json!({
            "raw": user,
            "normalized_command": command,
            "intent": intent,
            "args": {},
            "explanation": format!("Mock模式：{label}命令"),
        })
        .to_string()
    }
}

#[async_trait]
impl CompletionBackend for KeywordMock {
    async fn send(&self, request: &CompletionRequest) -> CompletionResult<String> {
        Ok(self.respond(request))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Test backend that replays scripted results in order.
///
/// Once the script is exhausted every call returns the fallback result.
/// Thread-safe via `Mutex` (fine for test contexts).
pub struct ScriptedBackend {
    script: Mutex<VecDeque<CompletionResult<String>>>,
    fallback: CompletionResult<String>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<CompletionResult<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Err(CompletionError::Transport("script exhausted".into())),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Return the same result on every call.
    pub fn always(result: CompletionResult<String>) -> Self {
        Self {
            fallback: result,
            ..Self::new(Vec::new())
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `send` calls observed.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// All recorded requests.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Get the last recorded request.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn send(&self, request: &CompletionRequest) -> CompletionResult<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xw_protocol::ChatMessage;

    fn parse_request(input: &str) -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system("你是一个命令解析器"),
            ChatMessage::user(input),
        ])
    }

    fn field(json: &str, key: &str) -> String {
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        v[key].as_str().unwrap().to_string()
    }

    #[test]
    fn keyword_table_matches() {
        let mock = KeywordMock::new();
        let out = mock.respond(&parse_request("我要修炼"));
        assert_eq!(field(&out, "normalized_command"), "修炼");
        assert_eq!(field(&out, "intent"), "train");
        assert_eq!(field(&out, "explanation"), "Mock模式：修炼命令");

        let out = mock.respond(&parse_request("看看背包"));
        assert_eq!(field(&out, "normalized_command"), "打开背包");
        assert_eq!(field(&out, "intent"), "check");
    }

    #[test]
    fn unmatched_input_is_unknown() {
        let out = KeywordMock::new().respond(&parse_request("唱首歌"));
        assert_eq!(field(&out, "normalized_command"), "未知");
        assert_eq!(field(&out, "intent"), "unknown");
        assert_eq!(field(&out, "raw"), "唱首歌");
    }

    #[test]
    fn mock_is_deterministic() {
        let mock = KeywordMock::new();
        let req = parse_request("探索一下");
        assert_eq!(mock.respond(&req), mock.respond(&req));
    }

    #[test]
    fn summary_requests_get_summary() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system(format!("{SUMMARY_MARKER}。请压缩以下对话")),
            ChatMessage::user("用户: 修炼\n系统: 解析为修炼命令\n"),
        ]);
        assert_eq!(
            KeywordMock::new().respond(&req),
            "Mock模式：玩家进行了2次交互。"
        );
    }

    #[tokio::test]
    async fn scripted_replays_then_falls_back() {
        let backend = ScriptedBackend::new(vec![
            Err(CompletionError::Transport("reset".into())),
            Ok("ok".into()),
        ]);
        let req = parse_request("x");
        assert!(backend.send(&req).await.is_err());
        assert_eq!(backend.send(&req).await.unwrap(), "ok");
        assert!(matches!(
            backend.send(&req).await,
            Err(CompletionError::Transport(_))
        ));
        assert_eq!(backend.calls(), 3);
        assert_eq!(backend.last_request().unwrap(), req);
    }

    #[tokio::test]
    async fn always_repeats() {
        let backend = ScriptedBackend::always(Ok("same".into()));
        let req = parse_request("x");
        for _ in 0..3 {
            assert_eq!(backend.send(&req).await.unwrap(), "same");
        }
        assert_eq!(backend.requests().len(), 3);
    }
}
