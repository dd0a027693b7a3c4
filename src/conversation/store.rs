//! Persistence collaborator: conversations and their messages.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::LoopError;

/// Who authored a stored message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Sender {
    User,
    Agent,
}

/// A persisted chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Input for [`ConversationStore::create_message`].
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender: Sender,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Storage for conversations and messages.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, title: Option<String>) -> Result<Conversation, LoopError>;

    async fn get_conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>, LoopError>;

    /// Mark a conversation as ended; later turns are rejected.
    async fn end_conversation(&self, id: Uuid) -> Result<Conversation, LoopError>;

    async fn create_message(&self, message: NewMessage) -> Result<Message, LoopError>;

    /// Messages of a conversation in creation order.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, LoopError>;
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Vec<Message>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(&self, title: Option<String>) -> Result<Conversation, LoopError> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            title,
            created_at: Utc::now(),
            ended_at: None,
        };
        let mut state = self.inner.write().await;
        state.messages.insert(conversation.id, Vec::new());
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>, LoopError> {
        Ok(self.inner.read().await.conversations.get(&id).cloned())
    }

    async fn end_conversation(&self, id: Uuid) -> Result<Conversation, LoopError> {
        let mut state = self.inner.write().await;
        let conversation = state
            .conversations
            .get_mut(&id)
            .ok_or(LoopError::ConversationNotFound(id))?;
        conversation.ended_at.get_or_insert_with(Utc::now);
        Ok(conversation.clone())
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, LoopError> {
        let mut state = self.inner.write().await;
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(LoopError::ConversationNotFound(message.conversation_id));
        }
        let stored = Message {
            id: Uuid::new_v4(),
            conversation_id: message.conversation_id,
            sender: message.sender,
            content: message.content,
            created_at: Utc::now(),
        };
        state
            .messages
            .entry(stored.conversation_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, LoopError> {
        Ok(self
            .inner
            .read()
            .await
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_are_listed_in_creation_order() {
        let store = InMemoryConversationStore::new();
        let conv = store.create_conversation(None).await.unwrap();
        for (sender, text) in [(Sender::User, "hi"), (Sender::Agent, "hello")] {
            store
                .create_message(NewMessage {
                    conversation_id: conv.id,
                    sender,
                    content: text.into(),
                })
                .await
                .unwrap();
        }
        let contents: Vec<_> = store
            .list_messages(conv.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["hi", "hello"]);
    }

    #[tokio::test]
    async fn create_message_requires_conversation() {
        let store = InMemoryConversationStore::new();
        let missing = Uuid::new_v4();
        let err = store
            .create_message(NewMessage {
                conversation_id: missing,
                sender: Sender::User,
                content: "hi".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::ConversationNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn end_conversation_is_idempotent() {
        let store = InMemoryConversationStore::new();
        let conv = store.create_conversation(Some("t".into())).await.unwrap();
        let first = store.end_conversation(conv.id).await.unwrap();
        let second = store.end_conversation(conv.id).await.unwrap();
        assert!(first.is_ended());
        assert_eq!(first.ended_at, second.ended_at);
    }

    #[test]
    fn sender_uses_upper_case_on_the_wire() {
        assert_eq!(serde_json::to_value(Sender::Agent).unwrap(), "AGENT");
        assert_eq!(Sender::User.to_string(), "USER");
    }
}
