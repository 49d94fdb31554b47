//! Router error types.
//!
//! Routing itself never fails; these cover startup only.

use thiserror::Error;
use xw_nlp::ConfigError;

use crate::registry::CommandTag;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("command {tag} has no match patterns")]
    NoPatterns { tag: CommandTag },

    #[error("command {tag} cannot be registered, it is produced by the router itself")]
    ReservedTag { tag: CommandTag },

    #[error("command {tag} is registered in the nlp tier, which has no local patterns")]
    NlpTier { tag: CommandTag },

    #[error("pattern {pattern:?} maps to both {first} and {second} in overlapping contexts")]
    AmbiguousPattern {
        pattern: String,
        first: CommandTag,
        second: CommandTag,
    },

    #[error("invalid fuzzy pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Pipeline(#[from] ConfigError),
}

/// Convenience alias for router results.
pub type RouterResult<T> = Result<T, RouterError>;
