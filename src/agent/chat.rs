//! Chat agent: turns a stored conversation plus a new user message into a
//! tool-loop invocation.

use std::sync::Arc;

use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::agent_loop::{EventEmitter, EventStream, LoopOutcome, LoopRequest, StreamEvent, ToolLoop};
use crate::config::LoopConfig;
use crate::conversation::{
    ConversationStore, InMemoryConversationStore, Message, NewMessage, ResponseRules,
    ResponseValidator, Sender,
};
use crate::error::LoopError;
use crate::provider;
use crate::tools::builtin;
use crate::types::{ProviderMessage, Role};

/// Entry point for user turns and approval decisions.
#[derive(Debug)]
pub struct ChatAgent {
    tool_loop: Arc<ToolLoop>,
    system_prompt: String,
}

impl ChatAgent {
    pub fn new(tool_loop: Arc<ToolLoop>, system_prompt: impl Into<String>) -> Self {
        Self {
            tool_loop,
            system_prompt: system_prompt.into(),
        }
    }

    /// Wire the configured provider, the reference tools rooted at
    /// `workspace_root`, an in-memory conversation store and, when any
    /// response rule is set, a reply validator.
    pub fn from_config(config: &LoopConfig) -> Result<Self, LoopError> {
        let provider = provider::create_provider(config)?;
        let registry = builtin::default_registry(&config.workspace_root)?;
        let validator = ResponseRules::from_config(&config.response)?
            .map(|rules| Arc::new(rules) as Arc<dyn ResponseValidator>);
        let tool_loop = ToolLoop::builder()
            .provider(provider)
            .registry(Arc::new(registry))
            .store(Arc::new(InMemoryConversationStore::new()))
            .maybe_validator(validator)
            .max_iterations(config.max_iterations)
            .build();
        Ok(Self::new(Arc::new(tool_loop), config.system_prompt.clone()))
    }

    pub fn tool_loop(&self) -> &Arc<ToolLoop> {
        &self.tool_loop
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        self.tool_loop.store()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Start a turn for `content` on a background task.
    pub fn initiate(self: &Arc<Self>, conversation_id: Uuid, content: String) -> EventStream {
        let (emitter, events) = EventEmitter::channel();
        let this = Arc::clone(self);
        tokio::spawn(
            async move {
                this.initiate_with(conversation_id, content, &emitter).await;
            }
            .instrument(info_span!("turn", %conversation_id)),
        );
        events
    }

    /// Resolve an approval on a background task.
    pub fn resume(&self, approval_id: Uuid, approved: bool) -> EventStream {
        self.tool_loop.resume(approval_id, approved)
    }

    /// Persist the user message and run the turn on the current task.
    pub async fn initiate_with(
        &self,
        conversation_id: Uuid,
        content: String,
        emitter: &EventEmitter,
    ) -> LoopOutcome {
        match self.prepare(conversation_id, content, emitter).await {
            Ok(request) => self.tool_loop.drive(request, emitter).await,
            Err(err) => {
                debug!(%conversation_id, error = %err, "turn rejected");
                emitter.emit(StreamEvent::error(err.to_string()));
                LoopOutcome::failed(err.to_string())
            }
        }
    }

    async fn prepare(
        &self,
        conversation_id: Uuid,
        content: String,
        emitter: &EventEmitter,
    ) -> Result<LoopRequest, LoopError> {
        if content.trim().is_empty() {
            return Err(LoopError::InvalidArgument("message content is empty".into()));
        }
        let store = self.store();
        let conversation = store
            .get_conversation_by_id(conversation_id)
            .await?
            .ok_or(LoopError::ConversationNotFound(conversation_id))?;
        if conversation.is_ended() {
            return Err(LoopError::ConversationEnded(conversation_id));
        }

        let saved = store
            .create_message(NewMessage {
                conversation_id,
                sender: Sender::User,
                content,
            })
            .await?;
        emitter.emit(StreamEvent::MessageSaved {
            message_id: saved.id,
        });

        let history = store.list_messages(conversation_id).await?;
        Ok(LoopRequest {
            conversation_id,
            messages: history_to_provider(&history),
            system_prompt: self.system_prompt.clone(),
        })
    }
}

/// Map stored messages to provider messages.
///
/// Leading agent messages are dropped and consecutive messages from the
/// same sender are merged, so roles strictly alternate starting with user.
pub fn history_to_provider(history: &[Message]) -> Vec<ProviderMessage> {
    let mut out: Vec<(Role, String)> = Vec::with_capacity(history.len());
    for message in history {
        let role = match message.sender {
            Sender::User => Role::User,
            Sender::Agent => Role::Assistant,
        };
        if out.is_empty() && role == Role::Assistant {
            continue;
        }
        match out.last_mut() {
            Some((last, text)) if *last == role => {
                text.push_str("\n\n");
                text.push_str(&message.content);
            }
            _ => out.push((role, message.content.clone())),
        }
    }
    out.into_iter()
        .map(|(role, text)| match role {
            Role::User => ProviderMessage::user(text),
            Role::Assistant => ProviderMessage::assistant(text),
        })
        .collect()
}
