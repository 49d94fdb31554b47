use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tokens::estimate_tokens;

/// Summary standing in for a run of raw messages. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub summary: String,
    /// Raw messages this block replaces.
    pub message_count: usize,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// In [0, 1].
    #[serde(default = "default_importance")]
    pub importance: f64,
    #[serde(default)]
    pub token_estimate: usize,
}

fn default_importance() -> f64 {
    0.5
}

impl MemoryBlock {
    pub fn new(summary: impl Into<String>, message_count: usize, importance: f64) -> Self {
        let summary = summary.into();
        Self {
            token_estimate: estimate_tokens(&summary),
            summary,
            message_count,
            created_at: Utc::now(),
            importance: importance.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_estimates_tokens_and_clamps() {
        let block = MemoryBlock::new("玩家修炼了三次", 12, 1.7);
        assert_eq!(block.message_count, 12);
        assert_eq!(block.importance, 1.0);
        assert!(block.token_estimate > 0);
    }

    #[test]
    fn import_tolerates_missing_fields() {
        let json = r#"{"summary": "旧记忆", "message_count": 3}"#;
        let block: MemoryBlock = serde_json::from_str(json).unwrap();
        assert_eq!(block.importance, 0.5);
        assert_eq!(block.token_estimate, 0);
    }
}
