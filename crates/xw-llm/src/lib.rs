//! Completion client for the remote LLM service.
//!
//! - `CompletionBackend` trait for anything that turns a request into text
//! - `HttpBackend` for OpenAI-compatible chat-completion endpoints
//! - `CompletionClient` wrapping a backend with timeout, retry and backoff
//! - `KeywordMock` deterministic offline responses (config-toggled)
//! - `ScriptedBackend` recording test double

pub mod backend;
pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod mock;

pub use backend::CompletionBackend;
pub use backoff::Backoff;
pub use client::CompletionClient;
pub use config::ClientConfig;
pub use error::{CompletionError, CompletionResult};
pub use http::HttpBackend;
pub use mock::{KeywordMock, SUMMARY_MARKER, ScriptedBackend};
