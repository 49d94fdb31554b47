//! Command router for free-form player input.
//!
//! - `Registry` closed set of command tags with validated patterns
//! - `CommandRouter` System → Core → Context → Fuzzy, then the NLP delegate
//! - `Session` line-oriented JSON shell over the router
//! - `AppConfig` settings for the interactive shell

pub mod config;
pub mod error;
pub mod registry;
pub mod router;
pub mod session;

pub use config::AppConfig;
pub use error::{RouterError, RouterResult};
pub use registry::{CommandDefinition, CommandTag, Registry, STANDARD_COMMANDS};
pub use router::{CommandRouter, LOCAL_CONFIDENCE, NlpDelegate, RoutedCommand};
pub use session::Session;
