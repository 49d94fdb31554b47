//! Batched parsing for bursty callers.
//!
//! Inputs are grouped by the batch processor; each group is parsed
//! concurrently and every input resolves to exactly one `ParsedCommand`.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use xw_flow::{BatchProcessor, FlowError};
use xw_protocol::ParsedCommand;

use crate::fallback::FallbackParser;
use crate::pipeline::NlpPipeline;

pub struct BatchParser {
    processor: BatchProcessor<String, ParsedCommand>,
    fallback: FallbackParser,
    timeout: Duration,
}

impl BatchParser {
    pub fn new(pipeline: Arc<NlpPipeline>) -> Self {
        let config = pipeline.config().batch_config();
        let timeout = pipeline.config().batch_timeout();
        let processor = BatchProcessor::new(config, move |texts: Vec<String>| {
            let pipeline = Arc::clone(&pipeline);
            async move {
                tracing::debug!(size = texts.len(), "parsing batch");
                let parses = texts.iter().map(|text| pipeline.parse(text));
                Ok::<_, FlowError>(join_all(parses).await)
            }
        });
        Self {
            processor,
            fallback: FallbackParser::new(),
            timeout,
        }
    }

    /// Parse through the batcher. A batch error, or no result within the
    /// batch timeout, is answered by the fallback parser.
    pub async fn parse(&self, text: &str) -> ParsedCommand {
        let result = match self.processor.submit(text.to_string()) {
            Ok(handle) => handle.wait_timeout(self.timeout).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, "batch parse failed, using fallback");
                self.fallback.parse(text)
            }
        }
    }

    /// Results come back in input order.
    pub async fn parse_many<S: AsRef<str>>(&self, texts: &[S]) -> Vec<ParsedCommand> {
        join_all(texts.iter().map(|text| self.parse(text.as_ref()))).await
    }

    pub fn pending(&self) -> usize {
        self.processor.pending()
    }

    /// Flush whatever is pending and wait for it; later inputs go straight
    /// to the fallback parser.
    pub async fn close(&self) {
        self.processor.close().await;
    }
}
