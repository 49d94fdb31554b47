//! Batch processor.
//!
//! Submissions accumulate until either `size` items are pending or
//! `flush_interval` has passed since the first of them, then the whole group
//! goes to the handler in one call. At most `max_concurrent` handler calls
//! run at once, each bounded by `timeout`. Each submitter gets a
//! `BatchHandle` resolving to the result at its own position; a failed,
//! timed-out or short batch rejects every handle in it.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore, oneshot};

use crate::error::{FlowError, FlowResult};

type Handler<I, O> = Box<dyn Fn(Vec<I>) -> BoxFuture<'static, FlowResult<Vec<O>>> + Send + Sync>;
type Waiter<O> = oneshot::Sender<FlowResult<O>>;

#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Pending items that trigger an immediate flush.
    pub size: usize,
    /// Maximum time the first pending item waits for company.
    pub flush_interval: Duration,
    /// Handler calls allowed in flight at once.
    pub max_concurrent: usize,
    /// Upper bound on one handler call.
    pub timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: 8,
            flush_interval: Duration::from_millis(50),
            max_concurrent: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

struct Pending<I, O> {
    items: Vec<(I, Waiter<O>)>,
    /// Bumped on every flush so stale timers do nothing.
    generation: u64,
}

struct Inner<I, O> {
    handler: Handler<I, O>,
    config: BatchConfig,
    pending: Mutex<Pending<I, O>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Resolves to one submission's result.
pub struct BatchHandle<O> {
    rx: oneshot::Receiver<FlowResult<O>>,
}

impl<O> BatchHandle<O> {
    pub async fn wait(self) -> FlowResult<O> {
        self.rx.await.unwrap_or(Err(FlowError::Cancelled))
    }

    /// Like `wait`, giving up after `timeout`. The batch itself keeps going.
    pub async fn wait_timeout(self, timeout: Duration) -> FlowResult<O> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| FlowError::Timeout)?
    }
}

/// Holds one `in_flight` slot until the dispatched batch task ends, even if
/// the handler panics.
struct Dispatched<I, O>(Arc<Inner<I, O>>);

impl<I, O> Drop for Dispatched<I, O> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

pub struct BatchProcessor<I, O> {
    inner: Arc<Inner<I, O>>,
}

impl<I, O> Clone for BatchProcessor<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, O> BatchProcessor<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new<F, Fut>(config: BatchConfig, handler: F) -> Self
    where
        F: Fn(Vec<I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlowResult<Vec<O>>> + Send + 'static,
    {
        let config = BatchConfig {
            size: config.size.max(1),
            max_concurrent: config.max_concurrent.max(1),
            ..config
        };
        Self {
            inner: Arc::new(Inner {
                handler: Box::new(move |items| handler(items).boxed()),
                config,
                pending: Mutex::new(Pending {
                    items: Vec::new(),
                    generation: 0,
                }),
                permits: Arc::new(Semaphore::new(config.max_concurrent)),
                closed: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Queue one item. Must be called from within a tokio runtime.
    pub fn submit(&self, item: I) -> FlowResult<BatchHandle<O>> {
        let (tx, rx) = oneshot::channel();
        let inner = &self.inner;

        let mut pending = inner.pending();
        if inner.closed.load(Ordering::SeqCst) {
            return Err(FlowError::QueueClosed);
        }
        pending.items.push((item, tx));

        if pending.items.len() >= inner.config.size {
            let batch = take(&mut pending);
            drop(pending);
            Inner::dispatch(inner, batch);
        } else if pending.items.len() == 1 {
            let generation = pending.generation;
            drop(pending);
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                tokio::time::sleep(inner.config.flush_interval).await;
                let mut pending = inner.pending();
                if pending.generation == generation && !pending.items.is_empty() {
                    let batch = take(&mut pending);
                    drop(pending);
                    Inner::dispatch(&inner, batch);
                }
            });
        }

        Ok(BatchHandle { rx })
    }

    /// Submit and wait for the result.
    pub async fn process(&self, item: I) -> FlowResult<O> {
        self.submit(item)?.wait().await
    }

    pub fn pending(&self) -> usize {
        self.inner.pending().items.len()
    }

    /// Handler calls dispatched but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Refuse new submissions, flush what is pending and wait for every
    /// dispatched batch to finish. Idempotent.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let batch = take(&mut self.inner.pending());
        if !batch.is_empty() {
            Inner::dispatch(&self.inner, batch);
        }
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            idle.await;
        }
    }
}

fn take<I, O>(pending: &mut Pending<I, O>) -> Vec<(I, Waiter<O>)> {
    pending.generation += 1;
    std::mem::take(&mut pending.items)
}

impl<I, O> Inner<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn pending(&self) -> MutexGuard<'_, Pending<I, O>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(this: &Arc<Self>, batch: Vec<(I, Waiter<O>)>) {
        this.in_flight.fetch_add(1, Ordering::SeqCst);
        let slot = Dispatched(Arc::clone(this));
        tokio::spawn(async move {
            let inner = &slot.0;
            let _permit = Arc::clone(&inner.permits).acquire_owned().await;
            let (items, waiters): (Vec<I>, Vec<Waiter<O>>) = batch.into_iter().unzip();
            let expected = waiters.len();

            let outcome = tokio::time::timeout(inner.config.timeout, (inner.handler)(items))
                .await
                .unwrap_or(Err(FlowError::Timeout));
            match outcome {
                Ok(results) if results.len() == expected => {
                    for (waiter, result) in waiters.into_iter().zip(results) {
                        let _ = waiter.send(Ok(result));
                    }
                }
                Ok(results) => {
                    let err = FlowError::BatchFailed(format!(
                        "handler returned {} results for {expected} items",
                        results.len()
                    ));
                    tracing::warn!(error = %err, "batch rejected");
                    for waiter in waiters {
                        let _ = waiter.send(Err(err.clone()));
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, size = expected, "batch handler failed");
                    for waiter in waiters {
                        let _ = waiter.send(Err(err.clone()));
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn doubler(config: BatchConfig, calls: Arc<AtomicUsize>) -> BatchProcessor<u32, u32> {
        BatchProcessor::new(config, move |items: Vec<u32>| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FlowError>(items.into_iter().map(|n| n * 2).collect())
            }
        })
    }

    #[tokio::test]
    async fn size_trigger_flushes_one_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let processor = doubler(
            BatchConfig {
                size: 3,
                flush_interval: Duration::from_secs(10),
                max_concurrent: 1,
                ..BatchConfig::default()
            },
            calls.clone(),
        );

        let handles: Vec<_> = (1..=3).map(|n| processor.submit(n).unwrap()).collect();
        let mut results = Vec::new();
        for h in handles {
            results.push(h.wait().await.unwrap());
        }
        assert_eq!(results, vec![2, 4, 6]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timer_flushes_partial_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let processor = doubler(
            BatchConfig {
                size: 10,
                flush_interval: Duration::from_millis(30),
                max_concurrent: 1,
                ..BatchConfig::default()
            },
            calls.clone(),
        );

        let start = Instant::now();
        let a = processor.submit(5).unwrap();
        let b = processor.submit(7).unwrap();
        assert_eq!(processor.pending(), 2);
        assert_eq!(a.wait().await.unwrap(), 10);
        assert_eq!(b.wait().await.unwrap(), 14);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_error_rejects_every_handle() {
        let processor: BatchProcessor<u32, u32> = BatchProcessor::new(
            BatchConfig {
                size: 2,
                ..BatchConfig::default()
            },
            |_items: Vec<u32>| async { Err::<Vec<u32>, _>(FlowError::BatchFailed("upstream down".into())) },
        );
        let a = processor.submit(1).unwrap();
        let b = processor.submit(2).unwrap();
        assert_eq!(
            a.wait().await,
            Err(FlowError::BatchFailed("upstream down".into()))
        );
        assert!(b.wait().await.is_err());
    }

    #[tokio::test]
    async fn short_result_rejects_every_handle() {
        let processor: BatchProcessor<u32, u32> = BatchProcessor::new(
            BatchConfig {
                size: 2,
                ..BatchConfig::default()
            },
            |_items: Vec<u32>| async { Ok::<_, FlowError>(vec![1]) },
        );
        let a = processor.submit(1).unwrap();
        let b = processor.submit(2).unwrap();
        assert!(matches!(a.wait().await, Err(FlowError::BatchFailed(_))));
        assert!(matches!(b.wait().await, Err(FlowError::BatchFailed(_))));
    }

    #[tokio::test]
    async fn concurrency_cap_is_honoured() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let processor: BatchProcessor<u32, u32> = {
            let active = active.clone();
            let peak = peak.clone();
            BatchProcessor::new(
                BatchConfig {
                    size: 1,
                    flush_interval: Duration::from_millis(10),
                    max_concurrent: 2,
                    ..BatchConfig::default()
                },
                move |items: Vec<u32>| {
                    let active = active.clone();
                    let peak = peak.clone();
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, FlowError>(items)
                    }
                },
            )
        };

        let handles: Vec<_> = (0..6).map(|n| processor.submit(n).unwrap()).collect();
        for (n, h) in handles.into_iter().enumerate() {
            assert_eq!(h.wait().await.unwrap(), n as u32);
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn close_flushes_and_refuses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let processor = doubler(
            BatchConfig {
                size: 10,
                flush_interval: Duration::from_secs(10),
                max_concurrent: 1,
                ..BatchConfig::default()
            },
            calls.clone(),
        );
        let handle = processor.submit(21).unwrap();
        processor.close().await;
        assert_eq!(handle.wait().await.unwrap(), 42);
        assert_eq!(processor.in_flight(), 0);
        assert!(matches!(processor.submit(1), Err(FlowError::QueueClosed)));
    }

    #[tokio::test]
    async fn process_is_submit_and_wait() {
        let processor = doubler(BatchConfig::default(), Arc::new(AtomicUsize::new(0)));
        assert_eq!(processor.process(4).await.unwrap(), 8);
    }

    fn stalled(timeout: Duration) -> BatchProcessor<u32, u32> {
        BatchProcessor::new(
            BatchConfig {
                size: 1,
                timeout,
                ..BatchConfig::default()
            },
            |_items: Vec<u32>| async {
                std::future::pending::<()>().await;
                Ok::<Vec<u32>, FlowError>(Vec::new())
            },
        )
    }

    #[tokio::test]
    async fn wait_timeout_gives_up_on_stalled_handler() {
        let processor = stalled(Duration::from_secs(30));
        let handle = processor.submit(1).unwrap();
        assert_eq!(
            handle.wait_timeout(Duration::from_millis(20)).await,
            Err(FlowError::Timeout)
        );
        assert_eq!(processor.in_flight(), 1);
    }

    #[tokio::test]
    async fn handler_timeout_rejects_batch_and_unblocks_close() {
        let processor = stalled(Duration::from_millis(20));
        let handle = processor.submit(1).unwrap();
        assert_eq!(handle.wait().await, Err(FlowError::Timeout));

        tokio::time::timeout(Duration::from_secs(2), processor.close())
            .await
            .unwrap();
        assert_eq!(processor.in_flight(), 0);
    }

    #[tokio::test]
    async fn panicking_handler_still_lets_close_finish() {
        let processor: BatchProcessor<u32, u32> = BatchProcessor::new(
            BatchConfig {
                size: 1,
                ..BatchConfig::default()
            },
            |items: Vec<u32>| async move {
                if items.contains(&13) {
                    panic!("handler blew up");
                }
                Ok::<_, FlowError>(items)
            },
        );

        let bad = processor.submit(13).unwrap();
        assert_eq!(bad.wait().await, Err(FlowError::Cancelled));
        assert_eq!(processor.process(2).await, Ok(2));

        tokio::time::timeout(Duration::from_secs(2), processor.close())
            .await
            .unwrap();
        assert_eq!(processor.in_flight(), 0);
    }
}
