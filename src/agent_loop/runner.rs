//! The tool loop: provider round-trips, risk-gated tool dispatch, resumption.

use std::sync::Arc;

use futures::StreamExt;
use tokio::time::{self, Duration};
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::DEFAULT_MAX_ITERATIONS;
use crate::conversation::{ConversationStore, NewMessage, ResponseValidator, Sender};
use crate::error::LoopError;
use crate::provider::{CompletionProvider, CompletionRequest, ToolDeclaration};
use crate::tools::{ToolExecutionContext, ToolRegistry};
use crate::types::{ContentBlock, ProviderEvent, ProviderMessage, ToolCall};

use super::approvals::{
    rejection_message, ApprovalStore, InMemoryApprovalStore, PendingApproval,
};
use super::events::{EventEmitter, EventStream, StreamEvent, ToolResultEvent};
use super::types::{IterationOutcome, LoopOutcome, LoopRequest, LoopState};

const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

fn default_approvals() -> Arc<dyn ApprovalStore> {
    Arc::new(InMemoryApprovalStore::new())
}

/// Drives turns against a provider, a tool registry and an approval store.
///
/// One `ToolLoop` is shared by every conversation; all per-turn state lives
/// in the invocation.
#[derive(bon::Builder)]
pub struct ToolLoop {
    provider: Arc<dyn CompletionProvider>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    #[builder(default = default_approvals())]
    approvals: Arc<dyn ApprovalStore>,
    validator: Option<Arc<dyn ResponseValidator>>,
    /// Provider round-trips allowed per invocation.
    #[builder(default = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,
    /// Longest wait for the next provider event.
    #[builder(default = DEFAULT_STREAM_IDLE_TIMEOUT)]
    stream_idle_timeout: Duration,
}

impl std::fmt::Debug for ToolLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolLoop")
            .field("provider", &self.provider.provider_name())
            .field("registry", &self.registry)
            .field("pending_approvals", &self.approvals.len())
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl ToolLoop {
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn approvals(&self) -> &Arc<dyn ApprovalStore> {
        &self.approvals
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn validator(&self) -> Option<&Arc<dyn ResponseValidator>> {
        self.validator.as_ref()
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Start a turn on a background task and return its event stream.
    ///
    /// Dropping the stream does not cancel the turn.
    pub fn run(self: &Arc<Self>, request: LoopRequest) -> EventStream {
        let (emitter, events) = EventEmitter::channel();
        let this = Arc::clone(self);
        let span = info_span!("turn", conversation_id = %request.conversation_id);
        tokio::spawn(
            async move {
                this.drive(request, &emitter).await;
            }
            .instrument(span),
        );
        events
    }

    /// Resolve a pending approval on a background task and stream the rest
    /// of the turn.
    pub fn resume(self: &Arc<Self>, approval_id: Uuid, approved: bool) -> EventStream {
        let (emitter, events) = EventEmitter::channel();
        let this = Arc::clone(self);
        let span = info_span!("resume", %approval_id, approved);
        tokio::spawn(
            async move {
                this.resume_with(approval_id, approved, &emitter).await;
            }
            .instrument(span),
        );
        events
    }

    /// Run a turn to its end on the current task.
    pub async fn drive(&self, request: LoopRequest, emitter: &EventEmitter) -> LoopOutcome {
        let mut state = LoopState::new(request);
        self.drive_state(&mut state, emitter).await
    }

    /// Resolve a pending approval and continue the suspended turn.
    ///
    /// The approval is removed before anything else happens, so a second
    /// resolution of the same id fails without running the tool again.
    pub async fn resume_with(
        &self,
        approval_id: Uuid,
        approved: bool,
        emitter: &EventEmitter,
    ) -> LoopOutcome {
        let Some(pending) = self.approvals.take(approval_id) else {
            let err = LoopError::ApprovalNotFound(approval_id);
            debug!(%approval_id, "approval not found");
            emitter.emit(StreamEvent::error(err.to_string()));
            return LoopOutcome::failed(err.to_string());
        };
        debug!(
            %approval_id,
            tool = %pending.tool_name,
            approved,
            "resolving approval"
        );

        let call = pending.tool_call();
        let resolved = if approved {
            self.execute_call(pending.conversation_id, &call, emitter)
                .await
        } else {
            ContentBlock::tool_result(&call.id, rejection_message(&call.name), true)
        };

        let mut results = pending.prior_results;
        results.push(resolved);
        results.extend(pending.skipped_calls.iter().map(skipped_result));

        let mut messages = pending.messages;
        messages.push(ProviderMessage::tool_results(results));
        let mut state = LoopState::new(LoopRequest {
            conversation_id: pending.conversation_id,
            messages,
            system_prompt: pending.system_prompt,
        });
        self.drive_state(&mut state, emitter).await
    }

    async fn drive_state(&self, state: &mut LoopState, emitter: &EventEmitter) -> LoopOutcome {
        let declarations = self.registry.declarations();

        while state.iteration < self.max_iterations {
            match self.run_iteration(state, &declarations, emitter).await {
                IterationOutcome::Continue => state.iteration += 1,
                IterationOutcome::Complete => return self.complete(state, emitter).await,
                IterationOutcome::Suspend(pending) => {
                    let approval_id = pending.id;
                    let request = pending.request();
                    self.approvals.insert(*pending);
                    emitter.emit(StreamEvent::ToolApproval(request));
                    return LoopOutcome::AwaitingApproval { approval_id };
                }
                IterationOutcome::Fail(message) => {
                    warn!(iteration = state.iteration, error = %message, "turn failed");
                    emitter.emit(StreamEvent::error(message.clone()));
                    return LoopOutcome::failed(message);
                }
            }
        }

        warn!(
            conversation_id = %state.conversation_id,
            max_iterations = self.max_iterations,
            "iteration limit reached, finishing turn"
        );
        self.complete(state, emitter).await
    }

    /// One provider round-trip plus dispatch of the calls it requested.
    async fn run_iteration(
        &self,
        state: &mut LoopState,
        declarations: &[ToolDeclaration],
        emitter: &EventEmitter,
    ) -> IterationOutcome {
        let request = CompletionRequest {
            messages: state.messages.clone(),
            system_prompt: state.system_prompt.clone(),
            tools: (!declarations.is_empty()).then(|| declarations.to_vec()),
        };

        let mut stream = match self.provider.stream(&request).await {
            Ok(stream) => stream,
            Err(err) => return IterationOutcome::Fail(err.to_string()),
        };

        let mut tool_calls: Vec<ToolCall> = Vec::new();
        loop {
            let next = match time::timeout(self.stream_idle_timeout, stream.next()).await {
                Ok(next) => next,
                Err(_) => return IterationOutcome::Fail("stream idle timeout".to_string()),
            };
            let Some(event) = next else { break };
            match event {
                Ok(ProviderEvent::ContentDelta(text)) => {
                    if !text.is_empty() {
                        state.full_text.push_str(&text);
                        emitter.emit(StreamEvent::Content { text });
                    }
                }
                Ok(ProviderEvent::ToolUse(call)) => tool_calls.push(call),
                Ok(ProviderEvent::Error(message)) => return IterationOutcome::Fail(message),
                Ok(ProviderEvent::Done) => break,
                Err(err) => return IterationOutcome::Fail(err.to_string()),
            }
        }

        debug!(
            iteration = state.iteration,
            tool_calls = tool_calls.len(),
            text_len = state.full_text.len(),
            "iteration complete"
        );

        if tool_calls.is_empty() {
            return IterationOutcome::Complete;
        }

        state.messages.push(ProviderMessage::assistant_with_tool_calls(
            &state.full_text,
            &tool_calls,
        ));

        let mut results = Vec::with_capacity(tool_calls.len());
        for (index, call) in tool_calls.iter().enumerate() {
            let Some(risk_level) = self.registry.risk_level(&call.name) else {
                warn!(tool = %call.name, "model requested unknown tool");
                results.push(ContentBlock::tool_result(
                    &call.id,
                    LoopError::ToolNotFound(call.name.clone()).to_string(),
                    true,
                ));
                continue;
            };

            if risk_level.requires_approval() {
                let mut pending = PendingApproval::new(
                    call,
                    risk_level,
                    state.conversation_id,
                    state.messages.clone(),
                    state.system_prompt.clone(),
                );
                pending.prior_results = results;
                pending.skipped_calls = tool_calls[index + 1..].to_vec();
                if !pending.skipped_calls.is_empty() {
                    debug!(
                        skipped = pending.skipped_calls.len(),
                        "dropping tool calls after gated call"
                    );
                }
                return IterationOutcome::Suspend(Box::new(pending));
            }

            results.push(self.execute_call(state.conversation_id, call, emitter).await);
        }

        state.messages.push(ProviderMessage::tool_results(results));
        state.full_text.clear();
        IterationOutcome::Continue
    }

    /// Run a known tool and report it to the client.
    async fn execute_call(
        &self,
        conversation_id: Uuid,
        call: &ToolCall,
        emitter: &EventEmitter,
    ) -> ContentBlock {
        let ctx = ToolExecutionContext::for_call(conversation_id, call);
        debug!(tool = %call.name, tool_use_id = %call.id, "executing tool");
        let result = self
            .registry
            .execute(&call.name, call.input.clone(), &ctx)
            .await;

        emitter.emit(StreamEvent::ToolResult(ToolResultEvent {
            name: call.name.clone(),
            success: result.success,
            output: result.output.clone(),
            error: result.error.clone(),
        }));
        ContentBlock::tool_result(&call.id, result.to_content(), !result.success)
    }

    /// Validate and persist the final text, then emit `done`.
    async fn complete(&self, state: &mut LoopState, emitter: &EventEmitter) -> LoopOutcome {
        if state.full_text.is_empty() {
            emitter.emit(StreamEvent::Done { message_id: None });
            return LoopOutcome::Completed { message_id: None };
        }

        if let Some(validator) = &self.validator {
            if let Err(err) = validator.validate_response(&state.full_text).into_result() {
                warn!(error = %err, "response failed validation");
                emitter.emit(StreamEvent::Warning {
                    text: err.to_string(),
                });
            }
        }

        let saved = self
            .store
            .create_message(NewMessage {
                conversation_id: state.conversation_id,
                sender: Sender::Agent,
                content: std::mem::take(&mut state.full_text),
            })
            .await;

        match saved {
            Ok(message) => {
                debug!(message_id = %message.id, "assistant message saved");
                emitter.emit(StreamEvent::Done {
                    message_id: Some(message.id),
                });
                LoopOutcome::Completed {
                    message_id: Some(message.id),
                }
            }
            Err(err) => {
                error!(error = %err, "failed to persist assistant message");
                emitter.emit(StreamEvent::error(err.to_string()));
                LoopOutcome::failed(err.to_string())
            }
        }
    }
}

fn skipped_result(call: &ToolCall) -> ContentBlock {
    ContentBlock::tool_result(
        &call.id,
        format!(
            "Tool '{}' was not run because an earlier call in the same step needed approval.",
            call.name
        ),
        true,
    )
}
