//! Context compressor.
//!
//! Keeps conversational history injected into prompts bounded: a sliding
//! window of the most recent raw messages plus a ring of memory blocks, each
//! summarizing one backlog of older messages.
//!
//! Summarization runs outside the state lock; the backlog is taken under
//! the lock, summarized, then the finished block is pushed under it again.

mod memory;
mod summarizer;
mod tokens;

pub use memory::MemoryBlock;
pub use summarizer::{Summarizer, Summary, extractive_summary, importance};
pub use tokens::estimate_tokens;

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use xw_llm::CompletionClient;

use crate::config::PipelineConfig;

#[derive(Debug, Clone, Copy)]
pub struct CompressorConfig {
    /// Raw messages kept verbatim.
    pub window_size: usize,
    /// Backlog length that triggers summarization.
    pub block_size: usize,
    /// Memory blocks kept before the oldest is evicted.
    pub max_blocks: usize,
    /// Estimated total tokens that trigger summarization.
    pub token_threshold: usize,
    /// Rendered-context size above which a warning is logged.
    pub token_budget: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            block_size: 30,
            max_blocks: 10,
            token_threshold: 3_000,
            token_budget: 3_500,
        }
    }
}

impl From<&PipelineConfig> for CompressorConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            window_size: config.context_window_size,
            block_size: config.summarization_threshold,
            max_blocks: config.max_memory_blocks,
            token_threshold: config.summarization_token_threshold,
            token_budget: config.context_token_budget,
        }
    }
}

/// Compressor counters and current occupancy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressorStats {
    pub total_messages: u64,
    pub total_compressions: u64,
    /// Estimated tokens removed from prompts by summarization.
    pub total_tokens_saved: i64,
    /// Summaries that had to use the extractive rule.
    pub compression_errors: u64,
    pub current_memory_blocks: usize,
    pub current_recent_messages: usize,
    pub current_pending_messages: usize,
    pub estimated_total_tokens: usize,
    /// Current tokens over current-plus-saved tokens; 1.0 before any compression.
    pub compression_ratio: f64,
}

#[derive(Default)]
struct State {
    recent: VecDeque<String>,
    pending: Vec<String>,
    blocks: VecDeque<MemoryBlock>,
    total_messages: u64,
    total_compressions: u64,
    total_tokens_saved: i64,
    compression_errors: u64,
}

impl State {
    fn estimated_total_tokens(&self) -> usize {
        self.blocks.iter().map(|b| b.token_estimate).sum::<usize>()
            + self.recent.iter().map(|m| estimate_tokens(m)).sum::<usize>()
            + self.pending.iter().map(|m| estimate_tokens(m)).sum::<usize>()
    }
}

pub struct ContextCompressor {
    config: CompressorConfig,
    summarizer: Summarizer,
    state: Mutex<State>,
}

impl ContextCompressor {
    /// `client = None` summarizes with the extractive rule only.
    pub fn new(config: CompressorConfig, client: Option<Arc<CompletionClient>>) -> Self {
        let config = CompressorConfig {
            window_size: config.window_size.max(1),
            block_size: config.block_size.max(1),
            max_blocks: config.max_blocks.max(1),
            ..config
        };
        tracing::debug!(
            window = config.window_size,
            block = config.block_size,
            max_blocks = config.max_blocks,
            "context compressor created"
        );
        Self {
            config,
            summarizer: Summarizer::new(client),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ingest one message, summarizing the backlog if it crossed a threshold.
    pub async fn append(&self, message: impl Into<String>) {
        let message = message.into();
        if message.is_empty() {
            return;
        }

        let backlog = {
            let mut state = self.state();
            state.total_messages += 1;
            state.recent.push_back(message.clone());
            while state.recent.len() > self.config.window_size {
                state.recent.pop_front();
            }
            state.pending.push(message);

            let due = state.pending.len() >= self.config.block_size
                || state.estimated_total_tokens() > self.config.token_threshold;
            if due {
                let take = state.pending.len().min(self.config.block_size);
                Some(state.pending.drain(..take).collect::<Vec<_>>())
            } else {
                None
            }
        };

        if let Some(backlog) = backlog {
            self.compress(backlog).await;
        }
    }

    async fn compress(&self, backlog: Vec<String>) {
        let started = Instant::now();
        let summary = self.summarizer.summarize(&backlog).await;
        let text = if summary.text.is_empty() {
            format!("[{}条历史消息]", backlog.len())
        } else {
            summary.text
        };
        let block = MemoryBlock::new(text, backlog.len(), importance(&backlog));

        let tokens_before: usize = backlog.iter().map(|m| estimate_tokens(m)).sum();
        let saved = tokens_before as i64 - block.token_estimate as i64;

        let mut state = self.state();
        state.blocks.push_back(block);
        while state.blocks.len() > self.config.max_blocks {
            state.blocks.pop_front();
        }
        state.total_compressions += 1;
        state.total_tokens_saved += saved;
        if summary.extractive {
            state.compression_errors += 1;
        }
        tracing::info!(
            messages = backlog.len(),
            tokens_saved = saved,
            extractive = summary.extractive,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "context backlog compressed"
        );
    }

    /// Memory-block summaries followed by the raw window.
    pub fn get_context(&self) -> String {
        let state = self.state();
        let mut parts: Vec<String> = Vec::new();

        if !state.blocks.is_empty() {
            parts.push("=== 历史记忆 ===".into());
            for (i, block) in state.blocks.iter().enumerate() {
                parts.push(format!("[记忆{}] {}", i + 1, block.summary));
            }
            parts.push(String::new());
        }
        if !state.recent.is_empty() {
            parts.push("=== 最近对话 ===".into());
            parts.extend(state.recent.iter().cloned());
        }
        drop(state);

        let context = parts.join("\n");
        let tokens = estimate_tokens(&context);
        if tokens > self.config.token_budget {
            tracing::warn!(
                tokens,
                budget = self.config.token_budget,
                "rendered context exceeds token budget"
            );
        }
        context
    }

    pub fn memory_blocks(&self) -> Vec<MemoryBlock> {
        self.state().blocks.iter().cloned().collect()
    }

    pub fn stats(&self) -> CompressorStats {
        let state = self.state();
        let estimated = state.estimated_total_tokens();
        let compression_ratio = if state.total_compressions == 0 {
            1.0
        } else {
            let original = state.total_tokens_saved + estimated as i64;
            if original <= 0 {
                1.0
            } else {
                estimated as f64 / original as f64
            }
        };
        CompressorStats {
            total_messages: state.total_messages,
            total_compressions: state.total_compressions,
            total_tokens_saved: state.total_tokens_saved,
            compression_errors: state.compression_errors,
            current_memory_blocks: state.blocks.len(),
            current_recent_messages: state.recent.len(),
            current_pending_messages: state.pending.len(),
            estimated_total_tokens: estimated,
            compression_ratio,
        }
    }

    /// Drop all history. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.state();
        state.recent.clear();
        state.pending.clear();
        state.blocks.clear();
        tracing::info!("context cleared");
    }

    pub fn export_blocks(&self) -> Vec<MemoryBlock> {
        self.memory_blocks()
    }

    /// Replace the memory blocks, keeping the newest `max_blocks`.
    pub fn import_blocks(&self, blocks: Vec<MemoryBlock>) {
        let count = blocks.len();
        let mut state = self.state();
        state.blocks = blocks.into();
        while state.blocks.len() > self.config.max_blocks {
            state.blocks.pop_front();
        }
        tracing::info!(count, "memory blocks imported");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(window: usize, block: usize, max_blocks: usize) -> ContextCompressor {
        ContextCompressor::new(
            CompressorConfig {
                window_size: window,
                block_size: block,
                max_blocks,
                ..CompressorConfig::default()
            },
            None,
        )
    }

    #[tokio::test]
    async fn window_keeps_most_recent() {
        let c = small(3, 100, 5);
        for i in 0..5 {
            c.append(format!("消息{i}")).await;
        }
        let ctx = c.get_context();
        assert!(ctx.starts_with("=== 最近对话 ==="));
        assert!(!ctx.contains("消息1"));
        assert!(ctx.contains("消息2"));
        assert!(ctx.contains("消息4"));
        assert_eq!(c.stats().current_recent_messages, 3);
    }

    #[tokio::test]
    async fn empty_messages_are_ignored() {
        let c = small(3, 3, 2);
        c.append("").await;
        assert_eq!(c.stats().total_messages, 0);
        assert!(c.get_context().is_empty());
    }

    #[tokio::test]
    async fn backlog_threshold_creates_block() {
        let c = small(5, 4, 3);
        for i in 0..4 {
            c.append(format!("用户: 修炼{i}")).await;
        }
        let blocks = c.memory_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].message_count, 4);
        assert!(blocks[0].summary.starts_with("玩家进行了4次交互"));

        let stats = c.stats();
        assert_eq!(stats.total_compressions, 1);
        assert_eq!(stats.current_pending_messages, 0);
        assert_eq!(stats.compression_errors, 1);

        let ctx = c.get_context();
        assert!(ctx.starts_with("=== 历史记忆 ===\n[记忆1] 玩家进行了4次交互"));
        assert!(ctx.contains("\n\n=== 最近对话 ===\n"));
    }

    #[tokio::test]
    async fn token_threshold_forces_compression() {
        let c = ContextCompressor::new(
            CompressorConfig {
                window_size: 2,
                block_size: 100,
                max_blocks: 3,
                token_threshold: 10,
                token_budget: 3_500,
            },
            None,
        );
        c.append("修".repeat(40)).await;
        assert_eq!(c.memory_blocks().len(), 1);
    }

    #[tokio::test]
    async fn block_count_is_bounded_and_context_stays_small() {
        let threshold = 5;
        let max_blocks = 3;
        let c = small(4, threshold, max_blocks);

        let mut lengths = Vec::new();
        for round in 1..=20 {
            for i in 0..threshold {
                c.append(format!("第{round}轮消息{i}")).await;
            }
            assert!(c.memory_blocks().len() <= max_blocks);
            lengths.push(c.get_context().chars().count());
        }
        let at_five = lengths[4];
        let at_twenty = lengths[19];
        assert!(at_twenty < at_five * 2, "{at_five} -> {at_twenty}");
        assert_eq!(c.stats().total_messages, 100);
        assert_eq!(c.stats().total_compressions, 20);
    }

    #[tokio::test]
    async fn oldest_block_is_evicted() {
        let c = small(2, 1, 2);
        c.append("甲").await;
        c.append("乙").await;
        c.append("丙").await;
        let summaries: Vec<_> = c.memory_blocks().into_iter().map(|b| b.summary).collect();
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].contains("乙"));
        assert!(summaries[1].contains("丙"));
    }

    #[tokio::test]
    async fn export_import_roundtrip() {
        let c = small(2, 2, 4);
        for i in 0..4 {
            c.append(format!("探索{i}")).await;
        }
        let exported = c.export_blocks();
        assert_eq!(exported.len(), 2);

        let other = small(2, 2, 1);
        other.import_blocks(exported.clone());
        assert_eq!(other.memory_blocks(), vec![exported[1].clone()]);
    }

    #[tokio::test]
    async fn clear_drops_history() {
        let c = small(2, 2, 4);
        for i in 0..3 {
            c.append(format!("修炼{i}")).await;
        }
        c.clear();
        assert!(c.get_context().is_empty());
        assert_eq!(c.stats().total_messages, 3);
        assert_eq!(c.stats().current_memory_blocks, 0);
    }
}
