//! Pipeline counters and gauges.
//!
//! Recording is lock-free except for the latency ring, which uses
//! `try_lock` and drops the sample under contention.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Latency samples retained for average / p95.
const LATENCY_SAMPLES: usize = 1024;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    total_requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    queue_depth: AtomicUsize,
    latencies_ms: Mutex<VecDeque<f64>>,
}

/// Point-in-time view of the pipeline, serializable for `:stats` and logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    /// Requests answered from the cache or the completion service.
    pub successes: u64,
    /// Requests answered by the fallback parser.
    pub failures: u64,
    pub cache_hit_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub queue_depth: usize,
    pub rate_limiter_utilization: f64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache(&self, hit: bool) {
        let counter = if hit {
            &self.cache_hits
        } else {
            &self.cache_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, success: bool, latency: Duration) {
        let counter = if success {
            &self.successes
        } else {
            &self.failures
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut ring) = self.latencies_ms.try_lock() {
            if ring.len() == LATENCY_SAMPLES {
                ring.pop_front();
            }
            ring.push_back(latency.as_secs_f64() * 1000.0);
        }
    }

    /// Depth of whatever queue feeds the pipeline; set by its owner.
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn snapshot(&self, rate_limiter_utilization: f64) -> MetricsSnapshot {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        let mut samples: Vec<f64> = self
            .latencies_ms
            .lock()
            .map(|ring| ring.iter().copied().collect())
            .unwrap_or_default();
        samples.sort_by(f64::total_cmp);
        let (avg, p95) = if samples.is_empty() {
            (0.0, 0.0)
        } else {
            let avg = samples.iter().sum::<f64>() / samples.len() as f64;
            let idx = ((samples.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
            (avg, samples[idx.min(samples.len() - 1)])
        };

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cache_hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            avg_latency_ms: avg,
            p95_latency_ms: p95,
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            rate_limiter_utilization,
        }
    }
}
