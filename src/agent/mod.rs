//! Agent system: user turns and approval decisions over stored conversations.

pub mod chat;

pub use chat::{history_to_provider, ChatAgent};
