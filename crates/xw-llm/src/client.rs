//! Fault-tolerant completion client.
//!
//! Wraps a `CompletionBackend` with a per-attempt timeout and a bounded retry
//! loop using exponential backoff with jitter. Mock mode answers from
//! `KeywordMock` before any of that runs. `close()` refuses new calls and
//! waits for in-flight ones to finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use xw_protocol::CompletionRequest;

use crate::backend::CompletionBackend;
use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::error::{CompletionError, CompletionResult};
use crate::http::HttpBackend;
use crate::mock::KeywordMock;

pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    mock: Option<KeywordMock>,
    timeout: Duration,
    max_attempts: u32,
    backoff: Backoff,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

/// Decrements the in-flight counter when a call finishes, however it ends.
struct InFlight<'a>(&'a CompletionClient);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

impl CompletionClient {
    /// Build a client from configuration: the HTTP backend, or the keyword
    /// mock when `use_mock` is set.
    pub fn from_config(config: &ClientConfig) -> CompletionResult<Self> {
        let backend: Arc<dyn CompletionBackend> = if config.use_mock {
            Arc::new(KeywordMock::new())
        } else {
            Arc::new(HttpBackend::new(config)?)
        };
        Ok(Self::with_backend(backend, config))
    }

    /// Build a client around an explicit backend. Mock mode still
    /// short-circuits when `config.use_mock` is set.
    pub fn with_backend(backend: Arc<dyn CompletionBackend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            mock: config.use_mock.then(KeywordMock::new),
            timeout: config.timeout(),
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::new(
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    pub fn is_mock(&self) -> bool {
        self.mock.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn backend_name(&self) -> &str {
        if self.mock.is_some() {
            "mock"
        } else {
            self.backend.name()
        }
    }

    /// Send a request, retrying retryable failures.
    ///
    /// After the last attempt the final error is returned as-is.
    pub async fn complete(&self, request: &CompletionRequest) -> CompletionResult<String> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight(self);

        if self.closed.load(Ordering::SeqCst) {
            return Err(CompletionError::Closed);
        }

        if let Some(mock) = &self.mock {
            return Ok(mock.respond(request));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.timeout, self.backend.send(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(CompletionError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(text) => {
                    tracing::debug!(attempt, backend = self.backend.name(), "completion succeeded");
                    return Ok(text);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "completion attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "completion failed");
                    return Err(e);
                }
            }
        }
    }

    /// Refuse new calls and wait until every in-flight call has finished.
    /// Idempotent.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            drained.await;
        }
        tracing::debug!("completion client closed");
    }
}
