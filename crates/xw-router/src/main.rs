//! xw-router: interactive command shell.
//!
//! Reads player lines from stdin, routes them through the command router
//! and NLP pipeline, and prints one JSON line per reply.

use std::io::BufRead;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use xw_flow::RequestQueue;
use xw_nlp::NlpPipeline;
use xw_router::session::{self, Session};
use xw_router::{AppConfig, CommandRouter, Registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "xw-router starting");

    // ── Load config ─────────────────────────────────────────────
    let mut config = match std::env::args().nth(1) {
        Some(path) => AppConfig::from_file(&path)?,
        None => AppConfig::default(),
    };
    config.apply_env();
    tracing::info!(
        context = %config.default_context,
        mock = config.pipeline.use_mock,
        "config loaded"
    );

    // ── Pipeline and router ─────────────────────────────────────
    let pipeline = Arc::new(NlpPipeline::new(config.pipeline.clone())?);
    let registry = Registry::standard()?;
    tracing::info!(commands = registry.len(), "command registry initialized");
    let router = CommandRouter::new(registry, config.history_len).with_delegate(pipeline.clone());

    // ── Input queue ─────────────────────────────────────────────
    let queue = Arc::new(RequestQueue::new(config.queue_capacity));
    spawn_stdin_reader(Arc::clone(&queue));

    let session = Session::new(Arc::new(router), Arc::clone(&pipeline), config.default_context);
    let mut worker = tokio::spawn(session::run(Arc::clone(&queue), session));

    tracing::info!("xw-router ready");

    tokio::select! {
        result = &mut worker => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            queue.close();
            worker.await?;
        }
    }

    pipeline.close().await;
    tracing::info!("xw-router stopped");
    Ok(())
}

/// Feed stdin lines into the queue from a dedicated thread; closes the
/// queue at end of input.
fn spawn_stdin_reader(queue: Arc<RequestQueue<String>>) {
    let handle = tokio::runtime::Handle::current();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if handle.block_on(queue.put(line, None)).is_err() {
                break;
            }
        }
        queue.close();
    });
}
