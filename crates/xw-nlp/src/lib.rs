//! NLP pipeline for free-form player commands.
//!
//! - `ResultCache` bounded LRU of remote parse results
//! - `ContextCompressor` sliding window plus summarized memory blocks
//! - `FallbackParser` no-network trigger table
//! - `NlpPipeline` cache → limiter → completion → validation, falling back on any failure
//! - `BatchParser` grouped parsing through the batch processor

pub mod batch;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod pipeline;
pub mod prompt;
pub mod response;

pub use batch::BatchParser;
pub use cache::{CacheInfo, LruCache, ResultCache, cache_key};
pub use config::{BatchSettings, PipelineConfig, PoolSettings, RateLimitConfig};
pub use context::{CompressorConfig, CompressorStats, ContextCompressor, MemoryBlock};
pub use error::{ConfigError, ConfigResult, PipelineError, PipelineResult};
pub use fallback::{FALLBACK_CONFIDENCE, FallbackParser, intent_for_command};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::NlpPipeline;
