pub mod chat;
pub mod command;
pub mod routing;

pub use chat::*;
pub use command::*;
pub use routing::*;
