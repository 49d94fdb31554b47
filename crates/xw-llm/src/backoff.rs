//! Exponential backoff with jitter between retry attempts.

use rand::Rng;
use std::time::Duration;

/// Delay schedule: `base * 2^(attempt-1)`, capped at `max`, then jittered
/// into the upper half of that window.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base_ms = base.as_millis() as u64;
        let max_ms = (max.as_millis() as u64).max(base_ms);
        Self { base_ms, max_ms }
    }

    /// Un-jittered ceiling for the given 1-based attempt.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let ms = self.base_ms.saturating_mul(1u64 << shift).min(self.max_ms);
        Duration::from_millis(ms)
    }

    /// Delay before retrying after the given 1-based attempt failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        let half = ceiling / 2;
        let jitter = rand::thread_rng().gen_range(0..=ceiling - half);
        Duration::from_millis(half + jitter)
    }
}
