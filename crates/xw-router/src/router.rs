//! Priority-tiered command router.
//!
//! Tries System, Core, Context and Fuzzy tiers in that order against the
//! registry, and only then hands the input to the NLP delegate with a
//! snapshot of the current context. Every input produces exactly one
//! `RoutedCommand`; routing has no error path.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use xw_nlp::NlpPipeline;
use xw_protocol::{CommandArgs, Origin, ParsedCommand, RouteSnapshot, Tier};

use crate::registry::{CommandTag, Registry, literal_key};

/// Confidence of commands matched by a local tier.
pub const LOCAL_CONFIDENCE: f64 = 1.0;

/// Resolves input no local tier matched.
#[async_trait]
pub trait NlpDelegate: Send + Sync {
    async fn resolve(&self, text: &str, snapshot: &RouteSnapshot) -> (ParsedCommand, Origin);
}

#[async_trait]
impl NlpDelegate for NlpPipeline {
    async fn resolve(&self, text: &str, snapshot: &RouteSnapshot) -> (ParsedCommand, Origin) {
        self.parse_in_context(text, Some(snapshot)).await
    }
}

/// The router's answer for one input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedCommand {
    pub command: CommandTag,
    pub args: CommandArgs,
    /// Tier that produced the command (`Nlp` for delegate and unmatched input).
    pub tier: Tier,
    pub origin: Origin,
    pub parsed: ParsedCommand,
}

impl RoutedCommand {
    pub fn name(&self) -> &'static str {
        self.command.as_str()
    }

    pub fn into_pair(self) -> (String, CommandArgs) {
        (self.command.as_str().to_string(), self.args)
    }
}

pub struct CommandRouter {
    registry: Registry,
    delegate: Option<Arc<dyn NlpDelegate>>,
    history: Mutex<VecDeque<String>>,
    history_len: usize,
}

impl CommandRouter {
    pub fn new(registry: Registry, history_len: usize) -> Self {
        Self {
            registry,
            delegate: None,
            history: Mutex::new(VecDeque::new()),
            history_len,
        }
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn NlpDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Most recent routed inputs, oldest first.
    pub fn recent_inputs(&self) -> Vec<String> {
        self.history().iter().cloned().collect()
    }

    fn remember(&self, text: &str) {
        if self.history_len == 0 {
            return;
        }
        let mut history = self.history();
        history.push_back(text.to_string());
        while history.len() > self.history_len {
            history.pop_front();
        }
    }

    pub fn snapshot(&self, context: &str) -> RouteSnapshot {
        RouteSnapshot {
            context: context.to_string(),
            recent_inputs: self.recent_inputs(),
            available_patterns: self.registry.available_patterns(context),
        }
    }

    /// Route one input in the given game context.
    pub async fn route(&self, text: &str, context: &str) -> RoutedCommand {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let routed = match self.route_local(&collapsed, text, context) {
            Some(local) => local,
            None => self.route_nlp(text, context).await,
        };
        tracing::debug!(
            command = %routed.command,
            tier = ?routed.tier,
            origin = ?routed.origin,
            context,
            "input routed"
        );
        self.remember(text);
        routed
    }

    fn route_local(&self, collapsed: &str, raw: &str, context: &str) -> Option<RoutedCommand> {
        let key = literal_key(collapsed);
        for tier in Tier::LOCAL {
            let (tag, args) = if tier == Tier::Fuzzy {
                let (definition, args) = self.registry.match_fuzzy(collapsed, context)?;
                (definition.tag, args)
            } else {
                match self.registry.match_literal(tier, &key, context) {
                    Some(definition) => (definition.tag, CommandArgs::new()),
                    None => continue,
                }
            };
            return Some(RoutedCommand {
                command: tag,
                parsed: ParsedCommand {
                    raw: raw.to_string(),
                    normalized_command: tag.canonical().to_string(),
                    intent: tag.intent(),
                    args: args.clone(),
                    explanation: format!("{tier:?} tier match"),
                    confidence: LOCAL_CONFIDENCE,
                },
                args,
                tier,
                origin: Origin::Router,
            });
        }
        None
    }

    async fn route_nlp(&self, text: &str, context: &str) -> RoutedCommand {
        let Some(delegate) = &self.delegate else {
            return unknown(text);
        };

        let snapshot = self.snapshot(context);
        let (parsed, origin) = delegate.resolve(text, &snapshot).await;
        let tag = CommandTag::from_normalized(&parsed.normalized_command);

        if !self.registry.is_available(tag, context) {
            tracing::warn!(
                command = %tag,
                context,
                allowed = ?self.registry.contexts_for(tag),
                "command not available in current context"
            );
            let args = CommandArgs::from([
                ("command".to_string(), tag.as_str().to_string()),
                ("context".to_string(), context.to_string()),
                ("message".to_string(), "命令在当前场景不可用".to_string()),
            ]);
            return RoutedCommand {
                command: CommandTag::ContextError,
                args,
                tier: Tier::Nlp,
                origin,
                parsed,
            };
        }

        let mut args = parsed.args.clone();
        args.insert("raw_text".into(), parsed.raw.clone());
        args.insert("intent".into(), parsed.intent.to_string());
        args.insert("explanation".into(), parsed.explanation.clone());
        args.insert("confidence".into(), format!("{:.2}", parsed.confidence));
        RoutedCommand {
            command: tag,
            args,
            tier: Tier::Nlp,
            origin,
            parsed,
        }
    }

    /// Commands usable in `context`, grouped by tier.
    pub fn help_text(&self, context: &str) -> String {
        let mut lines = vec!["=== 可用命令 ===".to_string()];

        if self.has_delegate() {
            lines.push("【智能命令解析已启用】".into());
            lines.push("您可以使用自然语言输入命令，例如：".into());
            lines.push("  - '四处看看' → 探索".into());
            lines.push("  - '休息一会儿' → 修炼".into());
            lines.push("  - '去丹药铺' → 移动到丹药铺".into());
        }

        for (tier, heading) in [
            (Tier::System, "【系统命令】"),
            (Tier::Core, "【通用命令】"),
            (Tier::Context, "【场景命令】"),
        ] {
            let patterns: Vec<&str> = self
                .registry
                .definitions()
                .iter()
                .filter(|d| d.tier == tier && d.applies_in(context))
                .filter_map(|d| d.patterns.first().copied())
                .collect();
            if !patterns.is_empty() {
                lines.push(String::new());
                lines.push(heading.to_string());
                lines.extend(patterns.iter().map(|p| format!("  {p}")));
            }
        }

        lines.push(String::new());
        lines.push("提示：在不同场景下可用的命令会有所不同".into());
        lines.join("\n")
    }
}

/// Result for input nothing could resolve.
fn unknown(text: &str) -> RoutedCommand {
    RoutedCommand {
        command: CommandTag::Unknown,
        args: CommandArgs::from([("raw_text".to_string(), text.to_string())]),
        tier: Tier::Nlp,
        origin: Origin::Router,
        parsed: ParsedCommand::unknown(text, "no tier matched", 0.0),
    }
}
