//! Concurrency primitive error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    #[error("queue is closed")]
    QueueClosed,

    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("operation timed out")]
    Timeout,

    #[error("pool is closed")]
    PoolClosed,

    #[error("batch failed: {0}")]
    BatchFailed(String),

    #[error("task was cancelled")]
    Cancelled,
}

/// Convenience alias for flow results.
pub type FlowResult<T> = Result<T, FlowError>;
