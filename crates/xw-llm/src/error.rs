//! Completion client error types.

use thiserror::Error;

/// Errors surfaced by a completion backend or the client wrapping it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompletionError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("upstream rejected request {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("completion client is closed")]
    Closed,
}

impl CompletionError {
    /// Classify an HTTP status into a server (5xx) or rejection error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 {
            Self::Server { status, message }
        } else {
            Self::Rejected { status, message }
        }
    }

    /// Timeouts, connection failures and 5xx responses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport(_) | Self::Server { .. }
        )
    }
}

/// Convenience alias for completion results.
pub type CompletionResult<T> = Result<T, CompletionError>;
