//! Sliding-window rate limiter.
//!
//! Grants at most `quota + burst` permits in any rolling `window`. Waiting
//! callers sleep outside the lock until the oldest grant ages out.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub struct RateLimiter {
    quota: usize,
    burst: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(quota: usize, window: Duration) -> Self {
        Self::with_burst(quota, window, 0)
    }

    pub fn with_burst(quota: usize, window: Duration, burst: usize) -> Self {
        Self {
            quota: quota.max(1),
            burst,
            window,
            grants: Mutex::new(VecDeque::new()),
        }
    }

    /// Permits available per window, burst included.
    pub fn limit(&self) -> usize {
        self.quota + self.burst
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn grants(&self, now: Instant) -> MutexGuard<'_, VecDeque<Instant>> {
        let mut grants = self.grants.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(&oldest) = grants.front() {
            if now.duration_since(oldest) >= self.window {
                grants.pop_front();
            } else {
                break;
            }
        }
        grants
    }

    /// Record a grant if one is available, else report how long until the
    /// oldest grant expires.
    fn try_grant(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut grants = self.grants(now);
        if grants.len() < self.limit() {
            grants.push_back(now);
            return Ok(());
        }
        let oldest = grants.front().copied().unwrap_or(now);
        Err((oldest + self.window).saturating_duration_since(now))
    }

    /// Take a permit without waiting.
    pub fn try_acquire(&self) -> bool {
        self.try_grant().is_ok()
    }

    /// Take a permit, waiting at most `timeout`. A zero timeout never waits.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let wait = match self.try_grant() {
                Ok(()) => return true,
                Err(wait) => wait,
            };
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(limit = self.limit(), "rate limit permit not granted");
                return false;
            }
            tokio::time::sleep(wait.min(deadline - now).max(Duration::from_millis(1))).await;
        }
    }

    /// Grants currently inside the window.
    pub fn in_window(&self) -> usize {
        self.grants(Instant::now()).len()
    }

    /// Fraction of the per-window limit in use, in [0, 1].
    pub fn utilization(&self) -> f64 {
        self.in_window() as f64 / self.limit() as f64
    }

    pub fn reset(&self) {
        self.grants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
