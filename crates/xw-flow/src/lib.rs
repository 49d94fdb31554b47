//! Concurrency primitives shared by the command pipeline.
//!
//! - `RequestQueue` bounded FIFO with blocking put/get and cooperative close
//! - `RateLimiter` sliding-window limiter with burst allowance
//! - `BatchProcessor` groups submissions by size or time and fans results back
//! - `TaskPool` explicitly opened/closed worker pool with cancelable handles

pub mod batch;
pub mod error;
pub mod pool;
pub mod queue;
pub mod rate_limit;

pub use batch::{BatchConfig, BatchHandle, BatchProcessor};
pub use error::{FlowError, FlowResult};
pub use pool::{TaskHandle, TaskPool};
pub use queue::RequestQueue;
pub use rate_limit::RateLimiter;
