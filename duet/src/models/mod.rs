mod chat;
mod config;
mod message;
mod presence;
mod types;

pub use chat::*;
pub use config::*;
pub use message::*;
pub use presence::*;
pub use types::*;
