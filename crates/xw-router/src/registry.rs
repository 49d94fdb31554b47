//! Static command registry.
//!
//! Commands form a closed set of tags; each definition binds a tag to its
//! literal patterns (or fuzzy regexes), aliases, tier and the contexts it is
//! valid in. The literal index and compiled regexes are built and checked
//! once, when the registry is constructed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use xw_protocol::{CommandArgs, Intent, Tier};

use crate::error::{RouterError, RouterResult};

/// Every command the router can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandTag {
    Help,
    Save,
    Quit,
    Status,
    Inventory,
    Explore,
    Cultivate,
    Breakthrough,
    Move,
    Talk,
    Trade,
    Attack,
    Defend,
    Flee,
    UseSkill,
    UseItem,
    /// NLP resolved a command that is not valid in the current context.
    ContextError,
    Unknown,
}

impl CommandTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Save => "save",
            Self::Quit => "quit",
            Self::Status => "status",
            Self::Inventory => "inventory",
            Self::Explore => "explore",
            Self::Cultivate => "cultivate",
            Self::Breakthrough => "breakthrough",
            Self::Move => "move",
            Self::Talk => "talk",
            Self::Trade => "trade",
            Self::Attack => "attack",
            Self::Defend => "defend",
            Self::Flee => "flee",
            Self::UseSkill => "use_skill",
            Self::UseItem => "use_item",
            Self::ContextError => "context_error",
            Self::Unknown => "unknown",
        }
    }

    /// Canonical Chinese command word, as the NLP pipeline names it.
    pub fn canonical(&self) -> &'static str {
        match self {
            Self::Help => "帮助",
            Self::Save => "保存",
            Self::Quit => "退出",
            Self::Status => "查看状态",
            Self::Inventory => "打开背包",
            Self::Explore => "探索",
            Self::Cultivate => "修炼",
            Self::Breakthrough => "突破",
            Self::Move => "前往",
            Self::Talk => "交谈",
            Self::Trade => "交易",
            Self::Attack => "攻击",
            Self::Defend => "防御",
            Self::Flee => "逃跑",
            Self::UseSkill => "技能",
            Self::UseItem => "使用物品",
            Self::ContextError => "场景错误",
            Self::Unknown => "未知",
        }
    }

    /// Map an NLP normalized command to a tag. Unrecognised words are `Unknown`.
    pub fn from_normalized(command: &str) -> Self {
        match command.trim() {
            "探索" => Self::Explore,
            "修炼" => Self::Cultivate,
            "查看状态" => Self::Status,
            "打开背包" => Self::Inventory,
            "前往" => Self::Move,
            "使用物品" | "使用" => Self::UseItem,
            "交谈" | "对话" => Self::Talk,
            "交易" => Self::Trade,
            "攻击" => Self::Attack,
            "防御" => Self::Defend,
            "逃跑" => Self::Flee,
            "技能" => Self::UseSkill,
            "突破" => Self::Breakthrough,
            "保存" => Self::Save,
            "退出" => Self::Quit,
            "帮助" => Self::Help,
            _ => Self::Unknown,
        }
    }

    pub fn intent(&self) -> Intent {
        match self {
            Self::Help | Self::Save | Self::Quit => Intent::System,
            Self::Status | Self::Inventory => Intent::Check,
            Self::Explore | Self::Attack | Self::Defend | Self::Flee | Self::UseSkill => {
                Intent::Action
            }
            Self::Cultivate | Self::Breakthrough => Intent::Train,
            Self::Move => Intent::Move,
            Self::Talk => Intent::Talk,
            Self::Trade => Intent::Trade,
            Self::UseItem => Intent::Use,
            Self::ContextError | Self::Unknown => Intent::Unknown,
        }
    }

    /// Tags the router emits on its own; never registrable.
    fn is_reserved(&self) -> bool {
        matches!(self, Self::ContextError | Self::Unknown)
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registry entry.
#[derive(Debug, Clone, Copy)]
pub struct CommandDefinition {
    pub tag: CommandTag,
    pub tier: Tier,
    /// Literal patterns, or regexes with named captures in the fuzzy tier.
    pub patterns: &'static [&'static str],
    pub aliases: &'static [&'static str],
    /// Contexts the command is valid in; empty means everywhere.
    pub contexts: &'static [&'static str],
}

impl CommandDefinition {
    pub fn applies_in(&self, context: &str) -> bool {
        self.contexts.is_empty() || self.contexts.contains(&context)
    }

    fn overlaps(&self, other: &CommandDefinition) -> bool {
        self.contexts.is_empty()
            || other.contexts.is_empty()
            || self.contexts.iter().any(|c| other.contexts.contains(c))
    }
}

const BATTLE: &[&str] = &["battle"];
const EXPLORATION: &[&str] = &["exploration"];
const SAFE_ZONE: &[&str] = &["safe_zone"];

const fn def(
    tag: CommandTag,
    tier: Tier,
    patterns: &'static [&'static str],
    aliases: &'static [&'static str],
    contexts: &'static [&'static str],
) -> CommandDefinition {
    CommandDefinition {
        tag,
        tier,
        patterns,
        aliases,
        contexts,
    }
}

/// The game's command table.
pub const STANDARD_COMMANDS: &[CommandDefinition] = &[
    // ── system ──────────────────────────────────────────────────
    def(CommandTag::Help, Tier::System, &["帮助", "help"], &["h", "?", "？"], &[]),
    def(CommandTag::Save, Tier::System, &["保存", "save"], &[], &[]),
    def(CommandTag::Quit, Tier::System, &["退出", "quit", "exit"], &["q"], &[]),
    // ── core ────────────────────────────────────────────────────
    def(CommandTag::Status, Tier::Core, &["状态", "查看状态", "status"], &["s", "st"], &[]),
    def(CommandTag::Inventory, Tier::Core, &["背包", "打开背包", "inventory"], &["i", "inv", "bag"], &[]),
    // ── context ─────────────────────────────────────────────────
    def(CommandTag::Flee, Tier::Context, &["逃", "逃跑", "flee"], &["run"], BATTLE),
    def(CommandTag::Attack, Tier::Context, &["攻击", "attack"], &["a"], BATTLE),
    def(CommandTag::Defend, Tier::Context, &["防御", "defend"], &["d"], BATTLE),
    def(CommandTag::UseSkill, Tier::Context, &["技能", "skill"], &[], BATTLE),
    def(CommandTag::Explore, Tier::Context, &["探索", "explore"], &["e"], EXPLORATION),
    def(CommandTag::Move, Tier::Context, &["移动", "move"], &["m"], EXPLORATION),
    def(CommandTag::Talk, Tier::Context, &["对话", "交谈", "talk"], &["t"], EXPLORATION),
    def(CommandTag::Trade, Tier::Context, &["交易", "trade"], &[], EXPLORATION),
    def(CommandTag::Cultivate, Tier::Context, &["修炼", "cultivate"], &["c"], &["exploration", "safe_zone"]),
    def(CommandTag::Breakthrough, Tier::Context, &["突破", "breakthrough"], &["b"], SAFE_ZONE),
    // ── fuzzy ───────────────────────────────────────────────────
    def(CommandTag::Move, Tier::Fuzzy, &[r"^(?:去|前往|go to)\s*(?P<location>.+)$"], &[], EXPLORATION),
    def(CommandTag::Attack, Tier::Fuzzy, &[r"^(?:攻击|attack)\s*(?P<target>.+)$"], &[], BATTLE),
    def(
        CommandTag::Talk,
        Tier::Fuzzy,
        &[
            r"^(?:和|跟)\s*(?P<target>.+?)\s*(?:对话|交谈|说话|聊天|聊聊)$",
            r"^talk to\s+(?P<target>.+)$",
        ],
        &[],
        EXPLORATION,
    ),
    def(CommandTag::UseItem, Tier::Fuzzy, &[r"^(?:使用|服用|use)\s*(?P<item>.+)$"], &[], &[]),
];

/// Trimmed, whitespace-collapsed, lowercased.
pub fn literal_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

struct FuzzyPattern {
    definition: usize,
    regex: Regex,
}

/// Validated definitions plus the derived literal and fuzzy indexes.
pub struct Registry {
    definitions: Vec<CommandDefinition>,
    /// Pattern or alias key → definitions it names.
    literal: HashMap<String, Vec<usize>>,
    fuzzy: Vec<FuzzyPattern>,
}

impl Registry {
    pub fn new(definitions: Vec<CommandDefinition>) -> RouterResult<Self> {
        let mut literal: HashMap<String, Vec<usize>> = HashMap::new();
        let mut fuzzy = Vec::new();

        for (id, definition) in definitions.iter().enumerate() {
            let tag = definition.tag;
            if tag.is_reserved() {
                return Err(RouterError::ReservedTag { tag });
            }
            if definition.tier == Tier::Nlp {
                return Err(RouterError::NlpTier { tag });
            }
            if definition.patterns.iter().all(|p| p.trim().is_empty()) {
                return Err(RouterError::NoPatterns { tag });
            }

            if definition.tier == Tier::Fuzzy {
                for pattern in definition.patterns {
                    let regex = Regex::new(&format!("(?i){pattern}")).map_err(|source| {
                        RouterError::InvalidPattern {
                            pattern: pattern.to_string(),
                            source,
                        }
                    })?;
                    fuzzy.push(FuzzyPattern {
                        definition: id,
                        regex,
                    });
                }
                continue;
            }

            for key in definition.patterns.iter().chain(definition.aliases) {
                let key = literal_key(key);
                if key.is_empty() {
                    continue;
                }
                let ids = literal.entry(key.clone()).or_default();
                if let Some(&clash) = ids.iter().find(|&&other| {
                    let other = &definitions[other];
                    other.tag != tag && other.overlaps(definition)
                }) {
                    return Err(RouterError::AmbiguousPattern {
                        pattern: key,
                        first: definitions[clash].tag,
                        second: tag,
                    });
                }
                ids.push(id);
            }
        }

        tracing::debug!(
            definitions = definitions.len(),
            literal_keys = literal.len(),
            fuzzy_patterns = fuzzy.len(),
            "command registry built"
        );
        Ok(Self {
            definitions,
            literal,
            fuzzy,
        })
    }

    pub fn standard() -> RouterResult<Self> {
        Self::new(STANDARD_COMMANDS.to_vec())
    }

    pub fn definitions(&self) -> &[CommandDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Literal (or alias) match within one tier.
    pub fn match_literal(&self, tier: Tier, key: &str, context: &str) -> Option<&CommandDefinition> {
        self.literal
            .get(key)?
            .iter()
            .map(|&id| &self.definitions[id])
            .find(|d| d.tier == tier && d.applies_in(context))
    }

    /// First fuzzy pattern valid in `context` that matches, with its named
    /// captures as arguments.
    pub fn match_fuzzy(&self, text: &str, context: &str) -> Option<(&CommandDefinition, CommandArgs)> {
        self.fuzzy.iter().find_map(|fuzzy| {
            let definition = &self.definitions[fuzzy.definition];
            if !definition.applies_in(context) {
                return None;
            }
            let captures = fuzzy.regex.captures(text)?;
            let args = fuzzy
                .regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    let value = captures.name(name)?.as_str().trim();
                    (!value.is_empty()).then(|| (name.to_string(), value.to_string()))
                })
                .collect();
            Some((definition, args))
        })
    }

    /// Whether `tag` may run in `context`. Commands the registry does not
    /// define at all are allowed.
    pub fn is_available(&self, tag: CommandTag, context: &str) -> bool {
        let mut defined = self.definitions.iter().filter(|d| d.tag == tag).peekable();
        defined.peek().is_none() || defined.any(|d| d.applies_in(context))
    }

    /// Contexts `tag` is restricted to; empty if it is valid everywhere.
    pub fn contexts_for(&self, tag: CommandTag) -> Vec<&'static str> {
        let mut contexts: Vec<&'static str> = Vec::new();
        for definition in self.definitions.iter().filter(|d| d.tag == tag) {
            if definition.contexts.is_empty() {
                return Vec::new();
            }
            for context in definition.contexts {
                if !contexts.contains(context) {
                    contexts.push(*context);
                }
            }
        }
        contexts
    }

    /// Literal patterns usable in `context`, in registry order.
    pub fn available_patterns(&self, context: &str) -> Vec<String> {
        let mut patterns: Vec<String> = Vec::new();
        for definition in &self.definitions {
            if definition.tier == Tier::Fuzzy || !definition.applies_in(context) {
                continue;
            }
            for pattern in definition.patterns {
                if !patterns.iter().any(|p| p == pattern) {
                    patterns.push(pattern.to_string());
                }
            }
        }
        patterns
    }
}
