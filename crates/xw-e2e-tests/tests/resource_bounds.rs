//! E2E tests for bounded resources: cache, context memory, rate limiter,
//! request queue and batching.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{TestHarness, fast_config, parse_reply};
use tokio::time::Instant;
use xw_flow::{BatchConfig, BatchProcessor, FlowError, RateLimiter, RequestQueue};
use xw_llm::ScriptedBackend;
use xw_nlp::{CompressorConfig, ContextCompressor, PipelineConfig, RateLimitConfig, cache_key};
use xw_protocol::Origin;

// ── Result cache ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_cache_evicts_least_recently_used() {
    let config = PipelineConfig {
        cache_size: 4,
        ..PipelineConfig::mock()
    };
    let h = TestHarness::with_config(config, ScriptedBackend::new(Vec::new()));

    for text in ["探索a1", "探索a2", "探索a3", "探索a4"] {
        h.pipeline.parse(text).await;
    }
    let (_, origin) = h.pipeline.parse_with_origin("探索a1").await;
    assert_eq!(origin, Origin::Cache);

    h.pipeline.parse("探索a5").await;

    let cache = h.pipeline.cache();
    assert_eq!(cache.len(), 4);
    assert!(cache.contains(&cache_key("探索a1")));
    assert!(!cache.contains(&cache_key("探索a2")));
    assert!(cache.contains(&cache_key("探索a5")));

    let info = h.pipeline.cache_info();
    assert_eq!(info.capacity, 4);
    assert_eq!(info.size, 4);
}

// ── Context compressor ──────────────────────────────────────────

fn bounded_compressor() -> ContextCompressor {
    ContextCompressor::new(
        CompressorConfig {
            window_size: 5,
            block_size: 10,
            max_blocks: 3,
            token_threshold: 1_000_000,
            token_budget: 1_000_000,
        },
        None,
    )
}

async fn feed(compressor: &ContextCompressor, count: usize) -> usize {
    let mut raw_chars = 0;
    for i in 0..count {
        let message = format!("用户: 第{i}次在山谷里探索，发现了一些灵草");
        raw_chars += message.chars().count();
        compressor.append(message).await;
    }
    raw_chars
}

#[tokio::test]
async fn e2e_context_memory_stays_bounded() {
    let small = bounded_compressor();
    let large = bounded_compressor();
    feed(&small, 100).await;
    let raw_chars = feed(&large, 200).await;

    for compressor in [&small, &large] {
        let stats = compressor.stats();
        assert!(stats.current_memory_blocks <= 3);
        assert_eq!(stats.current_recent_messages, 5);
        assert!(compressor.memory_blocks().len() <= 3);
    }
    assert_eq!(large.stats().total_messages, 200);
    assert_eq!(large.stats().total_compressions, 20);

    let small_len = small.get_context().chars().count();
    let large_len = large.get_context().chars().count();
    assert!(large_len * 2 < small_len * 3, "{large_len} vs {small_len}");
    assert!(large_len * 4 < raw_chars);
}

// ── Rate limiter ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_rate_limiter_quota_plus_one() {
    let limiter = RateLimiter::new(3, Duration::from_millis(200));
    for _ in 0..3 {
        assert!(limiter.try_acquire());
    }
    assert!(!limiter.acquire(Duration::ZERO).await);
    assert_eq!(limiter.utilization(), 1.0);

    let started = Instant::now();
    assert!(limiter.acquire(Duration::from_secs(2)).await);
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn e2e_rate_limited_pipeline_falls_back() {
    let config = PipelineConfig {
        rate_limit: RateLimitConfig {
            quota: 1,
            window_secs: 60,
            burst: 0,
            acquire_timeout_secs: 0,
        },
        ..fast_config()
    };
    let h = TestHarness::with_config(
        config,
        ScriptedBackend::always(Ok(parse_reply("探索", "action"))),
    );

    let (_, first) = h.pipeline.parse_with_origin("探索山谷").await;
    let (second, origin) = h.pipeline.parse_with_origin("修炼片刻").await;

    assert_eq!(first, Origin::Remote);
    assert_eq!(origin, Origin::Fallback);
    assert_eq!(second.normalized_command, "修炼");
    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.pipeline.metrics().rate_limiter_utilization, 1.0);
}

// ── Request queue ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_queue_full_then_closed() {
    let queue = RequestQueue::new(2);
    queue.try_put("探索").unwrap();
    queue.try_put("修炼").unwrap();

    assert_eq!(
        queue.try_put("状态"),
        Err(FlowError::QueueFull { capacity: 2 })
    );
    assert_eq!(
        queue.put("状态", Some(Duration::from_millis(20))).await,
        Err(FlowError::Timeout)
    );

    queue.close();
    assert_eq!(queue.try_put("背包"), Err(FlowError::QueueClosed));
    assert_eq!(queue.get().await, Ok("探索"));
    assert_eq!(queue.get().await, Ok("修炼"));
    assert_eq!(queue.get().await, Err(FlowError::QueueClosed));
}

#[tokio::test]
async fn e2e_queue_close_wakes_waiting_consumer() {
    let queue = Arc::new(RequestQueue::<String>::new(4));
    let waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.get().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.close();

    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, Err(FlowError::QueueClosed));
}

// ── Batch processor ─────────────────────────────────────────────

#[tokio::test]
async fn e2e_batch_results_follow_submission_order() {
    let config = BatchConfig {
        size: 4,
        flush_interval: Duration::from_millis(10),
        max_concurrent: 2,
        ..BatchConfig::default()
    };
    let processor: BatchProcessor<u32, u32> =
        BatchProcessor::new(config, |items: Vec<u32>| async move {
            Ok::<_, FlowError>(items.into_iter().map(|i| i * 10).collect())
        });

    let handles: Vec<_> = (0..10).map(|i| processor.submit(i).unwrap()).collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.wait().await.unwrap());
    }
    assert_eq!(results, (0..10).map(|i| i * 10).collect::<Vec<_>>());

    processor.close().await;
    assert_eq!(processor.in_flight(), 0);
    assert!(processor.submit(99).is_err());
}
