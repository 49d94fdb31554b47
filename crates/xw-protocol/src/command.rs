use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Command arguments as key-value pairs (e.g. `location = "丹药铺"`).
pub type CommandArgs = BTreeMap<String, String>;

/// Confidence reported for commands the remote service parsed without
/// stating its own confidence.
pub const REMOTE_DEFAULT_CONFIDENCE: f64 = 1.0;

/// Normalized command used when nothing could be recognised.
pub const UNKNOWN_COMMAND: &str = "未知";

/// Intent category of a parsed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Generic in-world action (explore, attack).
    Action,
    /// Cultivation / resting.
    Train,
    /// Inspect status or inventory.
    Check,
    /// Travel to a location.
    Move,
    /// Use or consume an item.
    Use,
    /// Talk to an NPC.
    Talk,
    /// Buy / sell.
    Trade,
    /// Out-of-world commands (help, save, quit).
    System,
    /// Several commands in one utterance ("先探索再修炼").
    ActionSequence,
    #[default]
    Unknown,
}

impl Intent {
    /// Map a free-form label (as returned by the completion service) to an intent.
    ///
    /// Unrecognised labels become `Unknown` instead of failing.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "action" => Self::Action,
            "train" => Self::Train,
            "check" => Self::Check,
            "move" => Self::Move,
            "use" => Self::Use,
            "talk" => Self::Talk,
            "trade" => Self::Trade,
            "system" => Self::System,
            "action_sequence" => Self::ActionSequence,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Train => "train",
            Self::Check => "check",
            Self::Move => "move",
            Self::Use => "use",
            Self::Talk => "talk",
            Self::Trade => "trade",
            Self::System => "system",
            Self::ActionSequence => "action_sequence",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured command produced from free-form player text.
///
/// Immutable once returned: produced whole by the router tiers, the remote
/// pipeline, the cache, or the fallback parser, never assembled from a mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Original player input.
    pub raw: String,
    /// Canonical command word (e.g. "修炼", "前往", "未知").
    pub normalized_command: String,
    /// Intent category.
    pub intent: Intent,
    /// Extracted arguments.
    #[serde(default)]
    pub args: CommandArgs,
    /// Short reason for the parse.
    #[serde(default)]
    pub explanation: String,
    /// Confidence score in [0, 1].
    pub confidence: f64,
}

impl ParsedCommand {
    /// An explicit "unknown" command that still carries the raw text.
    pub fn unknown(raw: impl Into<String>, explanation: impl Into<String>, confidence: f64) -> Self {
        Self {
            raw: raw.into(),
            normalized_command: UNKNOWN_COMMAND.to_string(),
            intent: Intent::Unknown,
            args: CommandArgs::new(),
            explanation: explanation.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.normalized_command == UNKNOWN_COMMAND || self.intent == Intent::Unknown
    }
}

/// Where a `ParsedCommand` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Matched by one of the router's literal / pattern tiers.
    Router,
    /// Served from the result cache.
    Cache,
    /// Parsed by the remote completion service.
    Remote,
    /// Produced by the local fallback parser.
    Fallback,
}
