use async_trait::async_trait;
use xw_protocol::CompletionRequest;

use crate::error::CompletionResult;

/// Anything that can turn a completion request into response text.
///
/// Implementations perform a single attempt. Timeouts, retries and mock
/// short-circuiting are the job of `CompletionClient`.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn send(&self, request: &CompletionRequest) -> CompletionResult<String>;

    /// Backend name (for logging).
    fn name(&self) -> &str;
}
