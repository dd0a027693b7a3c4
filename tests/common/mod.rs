//! Shared test helpers and mock provider.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use uuid::Uuid;

use loopgate::agent::ChatAgent;
use loopgate::agent_loop::{EventStream, StreamEvent, ToolLoop};
use loopgate::conversation::{
    Conversation, ConversationStore, InMemoryConversationStore, Message, NewMessage, Sender,
};
use loopgate::error::LoopError;
use loopgate::provider::{CompletionProvider, CompletionRequest, ProviderStream};
use loopgate::tools::{AgentTool, RiskLevel, ToolParameters, ToolRegistry};
use loopgate::types::{ProviderEvent, ToolCall};

enum Scripted {
    Events(Vec<Result<ProviderEvent, LoopError>>),
    OpenError(LoopError),
}

/// A mock provider that plays back queued responses and records requests.
///
/// When the queue is empty it answers with an empty, finished stream.
#[derive(Default)]
pub struct MockProvider {
    responses: Mutex<Vec<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a text-only response, streamed in two deltas.
    pub fn queue_text(&self, text: &str) {
        let mid = text.len() / 2;
        let mid = (0..=mid).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        self.queue_events(vec![
            ProviderEvent::ContentDelta(text[..mid].to_string()),
            ProviderEvent::ContentDelta(text[mid..].to_string()),
            ProviderEvent::Done,
        ]);
    }

    /// Queue a response that only requests one tool.
    pub fn queue_tool_call(&self, id: &str, name: &str, input: serde_json::Value) {
        self.queue_events(vec![tool_use(id, name, input), ProviderEvent::Done]);
    }

    pub fn queue_events(&self, events: Vec<ProviderEvent>) {
        self.responses
            .lock()
            .unwrap()
            .push(Scripted::Events(events.into_iter().map(Ok).collect()));
    }

    /// Queue a stream that yields `events` and then fails.
    pub fn queue_stream_error(&self, events: Vec<ProviderEvent>, err: LoopError) {
        let mut items: Vec<_> = events.into_iter().map(Ok).collect();
        items.push(Err(err));
        self.responses.lock().unwrap().push(Scripted::Events(items));
    }

    /// Queue a failure to open the stream at all.
    pub fn queue_open_error(&self, err: LoopError) {
        self.responses.lock().unwrap().push(Scripted::OpenError(err));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ProviderStream, LoopError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                None
            } else {
                Some(responses.remove(0))
            }
        };
        match next {
            None => Ok(futures::stream::iter(vec![Ok(ProviderEvent::Done)]).boxed()),
            Some(Scripted::Events(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(Scripted::OpenError(err)) => Err(err),
        }
    }
}

pub fn tool_use(id: &str, name: &str, input: serde_json::Value) -> ProviderEvent {
    ProviderEvent::ToolUse(ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        input,
    })
}

/// A tool that counts its executions and echoes its input.
pub fn counting_tool(name: &str, risk_level: RiskLevel) -> (Arc<AgentTool>, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let tool_name = name.to_string();
    let tool = AgentTool::new(
        name,
        format!("Test tool {name}"),
        ToolParameters::empty(),
        risk_level,
        move |args, _ctx| {
            let counter = Arc::clone(&counter);
            let tool_name = tool_name.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "tool": tool_name, "input": args.raw().clone() }))
            }
        },
    );
    (Arc::new(tool), runs)
}

/// Execution counters for the standard test tools.
pub struct Counters {
    pub file_list: Arc<AtomicUsize>,
    pub file_write: Arc<AtomicUsize>,
    pub shell_exec: Arc<AtomicUsize>,
}

impl Counters {
    pub fn shell_runs(&self) -> usize {
        self.shell_exec.load(Ordering::SeqCst)
    }

    pub fn list_runs(&self) -> usize {
        self.file_list.load(Ordering::SeqCst)
    }
}

/// Registry with stand-ins for the reference tools at their real risk levels.
pub fn test_registry() -> (ToolRegistry, Counters) {
    let registry = ToolRegistry::new();
    let (list, file_list) = counting_tool("file_list", RiskLevel::Low);
    let (write, file_write) = counting_tool("file_write", RiskLevel::Medium);
    let (shell, shell_exec) = counting_tool("shell_exec", RiskLevel::High);
    registry.register(list).unwrap();
    registry.register(write).unwrap();
    registry.register(shell).unwrap();
    (
        registry,
        Counters {
            file_list,
            file_write,
            shell_exec,
        },
    )
}

/// Everything a loop test needs.
pub struct Harness {
    pub provider: Arc<MockProvider>,
    pub store: Arc<dyn ConversationStore>,
    pub agent: Arc<ChatAgent>,
    pub counters: Counters,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryConversationStore::new()))
    }

    pub fn with_store(store: Arc<dyn ConversationStore>) -> Self {
        let provider = MockProvider::new();
        let (registry, counters) = test_registry();
        let tool_loop = ToolLoop::builder()
            .provider(provider.clone())
            .registry(Arc::new(registry))
            .store(Arc::clone(&store))
            .build();
        Self {
            provider,
            store,
            agent: Arc::new(ChatAgent::new(Arc::new(tool_loop), "You are a test agent.")),
            counters,
        }
    }

    pub async fn conversation(&self) -> Conversation {
        self.store.create_conversation(None).await.unwrap()
    }

    pub async fn agent_messages(&self, conversation_id: Uuid) -> Vec<Message> {
        self.store
            .list_messages(conversation_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.sender == Sender::Agent)
            .collect()
    }
}

pub async fn collect(events: EventStream) -> Vec<StreamEvent> {
    events.collect().await
}

pub fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::kind).collect()
}

pub fn approval_id(events: &[StreamEvent]) -> Uuid {
    events
        .iter()
        .find_map(|e| match e {
            StreamEvent::ToolApproval(request) => Some(request.id),
            _ => None,
        })
        .expect("no tool_approval event")
}

pub fn content_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Content { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Store whose agent-message writes always fail.
pub struct FailingAgentWrites {
    inner: InMemoryConversationStore,
}

impl FailingAgentWrites {
    pub fn new() -> Self {
        Self {
            inner: InMemoryConversationStore::new(),
        }
    }
}

#[async_trait]
impl ConversationStore for FailingAgentWrites {
    async fn create_conversation(&self, title: Option<String>) -> Result<Conversation, LoopError> {
        self.inner.create_conversation(title).await
    }

    async fn get_conversation_by_id(&self, id: Uuid) -> Result<Option<Conversation>, LoopError> {
        self.inner.get_conversation_by_id(id).await
    }

    async fn end_conversation(&self, id: Uuid) -> Result<Conversation, LoopError> {
        self.inner.end_conversation(id).await
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, LoopError> {
        if message.sender == Sender::Agent {
            return Err(LoopError::Persistence("disk full".into()));
        }
        self.inner.create_message(message).await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, LoopError> {
        self.inner.list_messages(conversation_id).await
    }
}
