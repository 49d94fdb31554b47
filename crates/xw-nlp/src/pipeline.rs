//! NLP pipeline: cache → rate limiter → completion service → validation,
//! with the fallback parser catching every failure.
//!
//! Callers always get exactly one `ParsedCommand`. Only results decoded from
//! a successful completion are cached; fallback results never are.

use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;
use xw_flow::{FlowResult, RateLimiter, TaskHandle, TaskPool};
use xw_llm::{CompletionBackend, CompletionClient};
use xw_protocol::{Origin, ParsedCommand, RouteSnapshot};

use crate::cache::{CacheInfo, ResultCache, cache_key};
use crate::config::PipelineConfig;
use crate::context::{CompressorConfig, CompressorStats, ContextCompressor};
use crate::error::{ConfigResult, PipelineError, PipelineResult};
use crate::fallback::FallbackParser;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::prompt::{parse_request, sanitize_input};
use crate::response::decode_response;

pub struct NlpPipeline {
    config: PipelineConfig,
    client: Arc<CompletionClient>,
    cache: ResultCache,
    compressor: ContextCompressor,
    fallback: FallbackParser,
    limiter: RateLimiter,
    metrics: PipelineMetrics,
    pool: TaskPool,
}

impl NlpPipeline {
    /// Build from configuration, resolving the API key from the environment
    /// unless mock mode is on.
    pub fn new(config: PipelineConfig) -> ConfigResult<Self> {
        config.validate()?;
        let api_key = config.resolve_api_key()?;
        let client = CompletionClient::from_config(&config.client_config(api_key))?;
        Ok(Self::assemble(config, Arc::new(client)))
    }

    /// Build around an explicit backend. `use_mock` still short-circuits it.
    pub fn with_backend(
        config: PipelineConfig,
        backend: Arc<dyn CompletionBackend>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let client = CompletionClient::with_backend(backend, &config.client_config(String::new()));
        Ok(Self::assemble(config, Arc::new(client)))
    }

    fn assemble(config: PipelineConfig, client: Arc<CompletionClient>) -> Self {
        let limiter = RateLimiter::with_burst(
            config.rate_limit.quota,
            Duration::from_secs(config.rate_limit.window_secs),
            config.rate_limit.burst,
        );
        let compressor =
            ContextCompressor::new(CompressorConfig::from(&config), Some(Arc::clone(&client)));
        tracing::info!(
            backend = client.backend_name(),
            mock = client.is_mock(),
            cache_size = config.cache_size,
            max_workers = config.pool.max_workers,
            "nlp pipeline ready"
        );
        Self {
            cache: ResultCache::new(config.cache_size),
            pool: config.open_pool(),
            compressor,
            fallback: FallbackParser::new(),
            limiter,
            metrics: PipelineMetrics::new(),
            client,
            config,
        }
    }

    pub async fn parse(&self, text: &str) -> ParsedCommand {
        self.parse_in_context(text, None).await.0
    }

    pub async fn parse_with_origin(&self, text: &str) -> (ParsedCommand, Origin) {
        self.parse_in_context(text, None).await
    }

    /// Parse one input, with the router's view of the game when it has one.
    pub async fn parse_in_context(
        &self,
        text: &str,
        snapshot: Option<&RouteSnapshot>,
    ) -> (ParsedCommand, Origin) {
        let request_id = Uuid::now_v7();
        let started = Instant::now();
        self.metrics.record_request();

        let key = cache_key(text);
        let cached = self.cache.get(&key);
        self.metrics.record_cache(cached.is_some());

        let (command, origin) = match cached {
            Some(hit) => {
                tracing::debug!(%request_id, key = %key, "cache hit");
                (hit, Origin::Cache)
            }
            None => match self.remote(text, snapshot, request_id).await {
                Ok(command) => {
                    self.cache.put(&key, command.clone());
                    (command, Origin::Remote)
                }
                Err(e) => {
                    tracing::warn!(%request_id, error = %e, "remote parse failed, using fallback");
                    (self.fallback.parse(text), Origin::Fallback)
                }
            },
        };

        self.metrics
            .record_outcome(origin != Origin::Fallback, started.elapsed());
        self.remember(text, &command).await;
        (command, origin)
    }

    async fn remote(
        &self,
        text: &str,
        snapshot: Option<&RouteSnapshot>,
        request_id: Uuid,
    ) -> PipelineResult<ParsedCommand> {
        let wait = self.config.acquire_timeout();
        if !self.client.is_mock() && !self.limiter.acquire(wait).await {
            return Err(PipelineError::RateLimited {
                timeout_ms: wait.as_millis() as u64,
            });
        }

        let request = parse_request(
            &sanitize_input(text),
            &self.compressor.get_context(),
            snapshot,
            self.config.temperature,
            self.config.max_tokens,
        );
        let reply = self.client.complete(&request).await?;
        let command = decode_response(&reply, text)?;
        tracing::info!(
            %request_id,
            command = %command.normalized_command,
            intent = %command.intent,
            confidence = command.confidence,
            "remote parse"
        );
        Ok(command)
    }

    async fn remember(&self, text: &str, command: &ParsedCommand) {
        self.compressor.append(format!("用户: {}", text.trim())).await;
        self.compressor
            .append(format!(
                "系统: 解析为{}命令 ({})",
                command.normalized_command, command.explanation
            ))
            .await;
    }

    /// Run `parse` on the pipeline's worker pool and hand back a cancelable
    /// handle. Refused with `PoolClosed` once `close` has started.
    pub fn spawn_parse(
        self: &Arc<Self>,
        text: impl Into<String>,
    ) -> FlowResult<TaskHandle<ParsedCommand>> {
        let pipeline = Arc::clone(self);
        let text = text.into();
        self.pool.spawn(async move { pipeline.parse(&text).await })
    }

    pub fn pool(&self) -> &TaskPool {
        &self.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn client(&self) -> &CompletionClient {
        &self.client
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn compressor(&self) -> &ContextCompressor {
        &self.compressor
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn context_stats(&self) -> CompressorStats {
        self.compressor.stats()
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.metrics.set_queue_depth(depth);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.limiter.utilization())
    }

    /// Drain spawned parses and in-flight completions, then refuse new ones.
    /// Later direct parses are answered by the fallback parser.
    pub async fn close(&self) {
        self.pool.close().await;
        self.client.close().await;
        tracing::info!("nlp pipeline closed");
    }
}
