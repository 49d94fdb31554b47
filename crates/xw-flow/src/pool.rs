//! Worker pool with an explicit lifecycle.
//!
//! A pool is created open and shut with `close()`; nothing is created lazily.
//! At most `max_workers` tasks run at once, the rest wait for a permit.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

use crate::error::{FlowError, FlowResult};

/// Handle to a task spawned on a `TaskPool`.
pub struct TaskHandle<T> {
    handle: JoinHandle<FlowResult<T>>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task. On timeout the task keeps running detached.
    pub async fn join(self, timeout: Option<Duration>) -> FlowResult<T> {
        let joined = match timeout {
            Some(t) => tokio::time::timeout(t, self.handle)
                .await
                .map_err(|_| FlowError::Timeout)?,
            None => self.handle.await,
        };
        joined.map_err(|_| FlowError::Cancelled)?
    }

    /// Abort the task. Joining afterwards yields `Cancelled`.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Pool state shared with the tasks it has admitted.
struct Shared {
    permits: Semaphore,
    admitted: AtomicUsize,
    idle: Notify,
}

/// Counts one admitted task until it finishes, is cancelled or panics.
struct Admitted(Arc<Shared>);

impl Drop for Admitted {
    fn drop(&mut self) {
        if self.0.admitted.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

pub struct TaskPool {
    shared: Arc<Shared>,
    max_workers: usize,
    open: AtomicBool,
}

impl TaskPool {
    pub fn open(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        tracing::debug!(max_workers, "task pool opened");
        Self {
            shared: Arc::new(Shared {
                permits: Semaphore::new(max_workers),
                admitted: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            max_workers,
            open: AtomicBool::new(true),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Tasks currently holding a worker slot.
    pub fn active(&self) -> usize {
        self.max_workers - self.shared.permits.available_permits()
    }

    /// Tasks accepted and not yet finished, running or waiting for a slot.
    pub fn admitted(&self) -> usize {
        self.shared.admitted.load(Ordering::SeqCst)
    }

    /// Count a new task, or refuse it once `close` has started. The count is
    /// raised before the open check so `close` cannot miss it.
    fn admit(&self) -> FlowResult<Admitted> {
        self.shared.admitted.fetch_add(1, Ordering::SeqCst);
        let guard = Admitted(Arc::clone(&self.shared));
        if !self.is_open() {
            return Err(FlowError::PoolClosed);
        }
        Ok(guard)
    }

    pub fn spawn<F, T>(&self, fut: F) -> FlowResult<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.admit()?;
        let handle = tokio::spawn(async move {
            let shared = Arc::clone(&guard.0);
            let _permit = shared
                .permits
                .acquire()
                .await
                .map_err(|_| FlowError::PoolClosed)?;
            let output = fut.await;
            drop(guard);
            Ok(output)
        });
        Ok(TaskHandle { handle })
    }

    /// Run blocking work on the blocking thread pool, still counted against
    /// `max_workers`.
    pub fn spawn_blocking<F, T>(&self, f: F) -> FlowResult<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.admit()?;
        let handle = tokio::spawn(async move {
            let shared = Arc::clone(&guard.0);
            let _permit = shared
                .permits
                .acquire()
                .await
                .map_err(|_| FlowError::PoolClosed)?;
            let output = tokio::task::spawn_blocking(f)
                .await
                .map_err(|_| FlowError::Cancelled);
            drop(guard);
            output
        });
        Ok(TaskHandle { handle })
    }

    /// Stop accepting work and wait until every admitted task has finished,
    /// including ones still waiting for a slot. Idempotent.
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        loop {
            let idle = self.shared.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.admitted() == 0 {
                break;
            }
            idle.await;
        }
        tracing::debug!("task pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_join() {
        let pool = TaskPool::open(2);
        let handle = pool.spawn(async { 40 + 2 }).unwrap();
        assert_eq!(handle.join(None).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn spawn_blocking_and_join() {
        let pool = TaskPool::open(1);
        let handle = pool.spawn_blocking(|| "修炼".len()).unwrap();
        assert_eq!(handle.join(Some(Duration::from_secs(1))).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn join_timeout() {
        let pool = TaskPool::open(1);
        let handle = pool
            .spawn(tokio::time::sleep(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(
            handle.join(Some(Duration::from_millis(20))).await,
            Err(FlowError::Timeout)
        );
    }

    #[tokio::test]
    async fn cancel_yields_cancelled() {
        let pool = TaskPool::open(1);
        let handle = pool
            .spawn(tokio::time::sleep(Duration::from_secs(5)))
            .unwrap();
        handle.cancel();
        assert_eq!(handle.join(None).await, Err(FlowError::Cancelled));
    }

    #[tokio::test]
    async fn worker_limit_is_enforced() {
        let pool = TaskPool::open(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let active = active.clone();
                let peak = peak.clone();
                pool.spawn(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();
        for h in handles {
            h.join(None).await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn close_waits_then_refuses() {
        let pool = TaskPool::open(2);
        let done = Arc::new(AtomicBool::new(false));
        let handle = {
            let done = done.clone();
            pool.spawn(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                done.store(true, Ordering::SeqCst);
            })
            .unwrap()
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        pool.close().await;
        pool.close().await;
        assert!(done.load(Ordering::SeqCst));
        assert!(!pool.is_open());
        assert!(matches!(pool.spawn(async {}), Err(FlowError::PoolClosed)));
        handle.join(None).await.unwrap();
    }

    #[tokio::test]
    async fn close_runs_tasks_admitted_just_before() {
        let pool = TaskPool::open(1);
        let first = pool.spawn(async { 7 }).unwrap();
        let second = pool.spawn_blocking(|| 8).unwrap();
        pool.close().await;

        assert_eq!(pool.admitted(), 0);
        assert_eq!(first.join(None).await, Ok(7));
        assert_eq!(second.join(None).await, Ok(8));
    }

    #[tokio::test]
    async fn close_waits_for_queued_tasks() {
        let pool = TaskPool::open(1);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..3)
            .map(|n| {
                let order = order.clone();
                pool.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    order.lock().unwrap().push(n);
                })
                .unwrap()
            })
            .collect();

        pool.close().await;
        assert_eq!(order.lock().unwrap().len(), 3);
        for h in handles {
            h.join(None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn cancelled_task_does_not_block_close() {
        let pool = TaskPool::open(1);
        let handle = pool
            .spawn(tokio::time::sleep(Duration::from_secs(30)))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(2), pool.close())
            .await
            .unwrap();
        assert_eq!(pool.admitted(), 0);
    }
}
