//! Local fallback parser.
//!
//! Pure substring matching over a static trigger table; no network, no
//! errors. Table order is the tie-break: the first command whose trigger
//! appears in the input wins. Commands that take an argument get everything
//! after the matched trigger.

use xw_protocol::{CommandArgs, Intent, ParsedCommand};

/// Confidence of every fallback-derived command.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

struct Rule {
    command: &'static str,
    intent: Intent,
    triggers: &'static [&'static str],
    /// Argument key filled with the text after the trigger.
    arg: Option<&'static str>,
}

const RULES: &[Rule] = &[
    Rule {
        command: "探索",
        intent: Intent::Action,
        triggers: &["探索", "四处看看", "四处游玩", "四处闲逛", "随便走走", "逛逛", "转转"],
        arg: None,
    },
    Rule {
        command: "修炼",
        intent: Intent::Train,
        triggers: &["修炼", "打坐", "闭关", "炼功", "修行", "练功", "休息"],
        arg: None,
    },
    Rule {
        command: "查看状态",
        intent: Intent::Check,
        triggers: &["状态", "查看状态", "角色信息", "看看状态", "瞧瞧状态"],
        arg: None,
    },
    Rule {
        command: "打开背包",
        intent: Intent::Check,
        triggers: &["背包", "物品", "查看背包", "打开背包", "看看背包"],
        arg: None,
    },
    Rule {
        command: "前往",
        intent: Intent::Move,
        triggers: &["去", "前往", "移动", "走", "过去"],
        arg: Some("location"),
    },
    Rule {
        command: "攻击",
        intent: Intent::Action,
        triggers: &["攻击", "打", "揍", "击打", "出手"],
        arg: Some("target"),
    },
    Rule {
        command: "对话",
        intent: Intent::Talk,
        triggers: &["对话", "交谈", "说话", "聊天", "聊"],
        arg: None,
    },
    Rule {
        command: "使用",
        intent: Intent::Use,
        triggers: &["使用", "用", "服用", "吃"],
        arg: Some("item"),
    },
];

/// Canonical command → intent, for commands named by the completion service.
pub fn intent_for_command(command: &str) -> Intent {
    match command {
        "探索" | "攻击" => Intent::Action,
        "修炼" => Intent::Train,
        "查看状态" | "打开背包" => Intent::Check,
        "前往" => Intent::Move,
        "对话" | "交谈" => Intent::Talk,
        "使用" | "使用物品" => Intent::Use,
        "交易" => Intent::Trade,
        _ => Intent::Unknown,
    }
}

/// Text after the first occurrence of `trigger`, with separators trimmed.
fn trailing(text: &str, trigger: &str) -> Option<String> {
    let start = text.find(trigger)? + trigger.len();
    let rest = text[start..].trim_matches(|c: char| c.is_whitespace() || "，。,.!！?？".contains(c));
    (!rest.is_empty()).then(|| rest.to_string())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackParser;

impl FallbackParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> ParsedCommand {
        let lowered = text.trim().to_lowercase();

        for rule in RULES {
            let Some(trigger) = rule.triggers.iter().find(|t| lowered.contains(*t)) else {
                continue;
            };

            let mut args = CommandArgs::new();
            if let Some(key) = rule.arg
                && let Some(value) = trailing(text.trim(), trigger)
            {
                args.insert(key.to_string(), value);
            }

            tracing::debug!(command = rule.command, trigger, "fallback pattern matched");
            return ParsedCommand {
                raw: text.to_string(),
                normalized_command: rule.command.to_string(),
                intent: rule.intent,
                args,
                explanation: "本地模式匹配".to_string(),
                confidence: FALLBACK_CONFIDENCE,
            };
        }

        ParsedCommand::unknown(text, "无法识别命令", FALLBACK_CONFIDENCE)
    }
}
