//! Interactive command session: turns queued input lines into JSON replies.
//!
//! Lines starting with `:` are shell directives (`:ctx <tag>`, `:stats`);
//! everything else is routed in the session's current context.

use serde_json::{Value, json};
use std::sync::Arc;
use xw_flow::RequestQueue;
use xw_nlp::NlpPipeline;

use crate::registry::CommandTag;
use crate::router::CommandRouter;

pub struct Session {
    router: Arc<CommandRouter>,
    pipeline: Arc<NlpPipeline>,
    context: String,
    finished: bool,
}

impl Session {
    pub fn new(router: Arc<CommandRouter>, pipeline: Arc<NlpPipeline>, context: impl Into<String>) -> Self {
        Self {
            router,
            pipeline,
            context: context.into(),
            finished: false,
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Set once a quit command has been routed.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Reply for one input line; blank lines get none.
    pub async fn handle(&mut self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(directive) = line.strip_prefix(':') {
            return Some(self.directive(directive));
        }

        let routed = self.router.route(line, &self.context).await;
        let mut reply = json!({
            "context": self.context,
            "command": routed.name(),
            "args": routed.args,
            "tier": routed.tier,
            "origin": routed.origin,
            "parsed": routed.parsed,
        });
        match routed.command {
            CommandTag::Help => reply["help"] = Value::String(self.router.help_text(&self.context)),
            CommandTag::Quit => self.finished = true,
            _ => {}
        }
        Some(reply)
    }

    fn directive(&mut self, directive: &str) -> Value {
        let mut parts = directive.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("ctx"), Some(context)) => {
                tracing::info!(from = %self.context, to = context, "context switched");
                self.context = context.to_string();
                json!({ "context": self.context })
            }
            (Some("ctx"), None) => json!({ "context": self.context }),
            (Some("stats"), _) => json!({
                "metrics": self.pipeline.metrics(),
                "cache": self.pipeline.cache_info(),
                "compressor": self.pipeline.context_stats(),
            }),
            _ => json!({ "error": format!("unknown directive :{directive}") }),
        }
    }
}

/// Drain `queue` through `session`, printing one JSON line per reply.
/// Returns when the queue is closed and empty, or after a quit command.
pub async fn run(queue: Arc<RequestQueue<String>>, mut session: Session) {
    while let Ok(line) = queue.get().await {
        session.pipeline.set_queue_depth(queue.len());
        if let Some(reply) = session.handle(&line).await {
            println!("{reply}");
        }
        if session.finished() {
            queue.close();
            break;
        }
    }
    tracing::info!("session ended");
}
