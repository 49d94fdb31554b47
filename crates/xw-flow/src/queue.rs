//! Bounded FIFO request queue.
//!
//! `put` waits while the queue is full and `get` waits while it is empty.
//! After `close()` every `put` fails immediately; `get` keeps draining what
//! is left and then fails too.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{FlowError, FlowResult};

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct RequestQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> RequestQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue, waiting for space. `timeout = None` waits indefinitely.
    pub async fn put(&self, item: T, timeout: Option<Duration>) -> FlowResult<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let space = self.not_full.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut state = self.state();
                if state.closed {
                    return Err(FlowError::QueueClosed);
                }
                if state.items.len() < self.capacity {
                    state.items.push_back(item);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, space).await.is_err() {
                        return Err(FlowError::Timeout);
                    }
                }
                None => space.await,
            }
        }
    }

    /// Enqueue without waiting.
    pub fn try_put(&self, item: T) -> FlowResult<()> {
        let mut state = self.state();
        if state.closed {
            return Err(FlowError::QueueClosed);
        }
        if state.items.len() >= self.capacity {
            return Err(FlowError::QueueFull {
                capacity: self.capacity,
            });
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue, waiting for an item. Fails once closed and drained.
    pub async fn get(&self) -> FlowResult<T> {
        self.get_inner(None).await
    }

    /// Dequeue, giving up after `timeout`.
    pub async fn get_timeout(&self, timeout: Duration) -> FlowResult<T> {
        self.get_inner(Some(Instant::now() + timeout)).await
    }

    async fn get_inner(&self, deadline: Option<Instant>) -> FlowResult<T> {
        loop {
            let ready = self.not_empty.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Ok(item);
                }
                if state.closed {
                    return Err(FlowError::QueueClosed);
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, ready).await.is_err() {
                        return Err(FlowError::Timeout);
                    }
                }
                None => ready.await,
            }
        }
    }

    /// Dequeue without waiting.
    pub fn try_get(&self) -> Option<T> {
        let item = self.state().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Refuse further puts and wake every waiter. Idempotent.
    pub fn close(&self) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        tracing::debug!("request queue closed");
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
