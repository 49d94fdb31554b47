//! Backlog summarization.
//!
//! Asks the completion service for a short third-person summary and falls
//! back to an extractive rule keyed on game-event words when the service is
//! unavailable or returns nothing.

use std::sync::Arc;
use xw_llm::{CompletionClient, SUMMARY_MARKER};
use xw_protocol::{ChatMessage, CompletionRequest};

const SUMMARY_INSTRUCTIONS: &str = "请将以下修仙世界游戏的对话历史压缩成一个简洁的摘要。

要求：
1. 保留关键事件和决策
2. 记录重要的游戏状态变化（境界提升、获得物品、位置变化等）
3. 保持时间顺序
4. 摘要长度不超过原文的 1/3
5. 使用第三人称叙述

请直接输出摘要内容，不要有任何额外说明。";

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 150;

/// Characters of history sent for summarization; longer input keeps its
/// head and tail.
const MAX_INPUT_CHARS: usize = 2_000;

/// Messages containing one of these are kept by the extractive summary.
const KEY_ACTIONS: &[&str] = &["探索", "修炼", "战斗", "获得", "前往", "提升", "突破"];

/// Event word → importance bonus.
const IMPORTANT_EVENTS: &[(&str, f64)] = &[
    ("突破", 0.2),
    ("获得", 0.1),
    ("战斗", 0.15),
    ("死亡", 0.25),
    ("任务完成", 0.2),
    ("境界提升", 0.25),
];

/// Result of one summarization.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub text: String,
    /// True when the extractive rule produced the text.
    pub extractive: bool,
}

pub struct Summarizer {
    client: Option<Arc<CompletionClient>>,
}

impl Summarizer {
    pub fn new(client: Option<Arc<CompletionClient>>) -> Self {
        Self { client }
    }

    pub async fn summarize(&self, messages: &[String]) -> Summary {
        let Some(client) = &self.client else {
            return Summary {
                text: extractive_summary(messages),
                extractive: true,
            };
        };

        let request = CompletionRequest::new(vec![
            ChatMessage::system(format!("{SUMMARY_MARKER}。{SUMMARY_INSTRUCTIONS}")),
            ChatMessage::user(clip_history(&messages.join("\n"))),
        ])
        .with_temperature(SUMMARY_TEMPERATURE)
        .with_max_tokens(SUMMARY_MAX_TOKENS);

        match client.complete(&request).await {
            Ok(text) if !text.trim().is_empty() => Summary {
                text: text.trim().to_string(),
                extractive: false,
            },
            Ok(_) => {
                tracing::warn!("summary came back empty, using extractive summary");
                Summary {
                    text: extractive_summary(messages),
                    extractive: true,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "summary request failed, using extractive summary");
                Summary {
                    text: extractive_summary(messages),
                    extractive: true,
                }
            }
        }
    }
}

/// Keep the first and last `MAX_INPUT_CHARS / 2` characters of long input.
fn clip_history(text: &str) -> String {
    let len = text.chars().count();
    if len <= MAX_INPUT_CHARS {
        return text.to_string();
    }
    let half = MAX_INPUT_CHARS / 2;
    let head: String = text.chars().take(half).collect();
    let tail: String = text.chars().skip(len - half).collect();
    format!("{head}\n...[中间部分已省略]...\n{tail}")
}

/// Rule-based summary: messages mentioning key actions, else first and last.
pub fn extractive_summary(messages: &[String]) -> String {
    if messages.is_empty() {
        return String::new();
    }

    let mut picked: Vec<&str> = messages
        .iter()
        .filter(|m| KEY_ACTIONS.iter().any(|k| m.contains(k)))
        .map(String::as_str)
        .collect();

    if picked.is_empty() {
        picked = if messages.len() > 2 {
            vec![messages[0].as_str(), messages[messages.len() - 1].as_str()]
        } else {
            messages.iter().map(String::as_str).collect()
        };
    }
    picked.truncate(3);

    format!(
        "玩家进行了{}次交互。主要行动包括：{}",
        messages.len(),
        picked.join("；")
    )
}

/// Importance in [0, 1]: 0.5 base, event-word bonuses, +0.1 for long runs.
pub fn importance(messages: &[String]) -> f64 {
    if messages.is_empty() {
        return 0.0;
    }
    let combined = messages.join(" ");
    let mut score = 0.5;
    for (event, weight) in IMPORTANT_EVENTS {
        if combined.contains(event) {
            score += weight;
        }
    }
    if messages.len() > 10 {
        score += 0.1;
    }
    f64::min(score, 1.0)
}
