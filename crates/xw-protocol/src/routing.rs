use serde::{Deserialize, Serialize};

/// Priority tier of the command router, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Out-of-world commands (help, save, quit).
    System,
    /// Commands valid everywhere (status, inventory, explore).
    Core,
    /// Commands scoped to a game context (combat-only, safe-zone-only).
    Context,
    /// Parameterised patterns ("去X" → move).
    Fuzzy,
    /// Deferred to the NLP pipeline.
    Nlp,
}

impl Tier {
    /// Tiers the router matches locally, in priority order.
    pub const LOCAL: [Tier; 4] = [Tier::System, Tier::Core, Tier::Context, Tier::Fuzzy];
}

/// What the router hands its NLP delegate when no local tier matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    /// Current game context tag (e.g. "exploration", "battle").
    pub context: String,
    /// Most recent routed inputs, oldest first.
    pub recent_inputs: Vec<String>,
    /// Literal patterns valid in the current context.
    pub available_patterns: Vec<String>,
}
