//! Collaborators consumed by the loop: persistence and response validation.

pub mod store;
pub mod validation;

pub use store::{
    Conversation, ConversationStore, InMemoryConversationStore, Message, NewMessage, Sender,
};
pub use validation::{ResponseRules, ResponseValidator, ValidationReport};
