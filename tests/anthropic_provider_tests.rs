//! Anthropic provider against a mocked Messages endpoint.
#![cfg(feature = "anthropic")]

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use loopgate::agent::ChatAgent;
use loopgate::agent_loop::{StreamEvent, ToolLoop};
use loopgate::config::LoopConfig;
use loopgate::conversation::{ConversationStore, InMemoryConversationStore, Sender};
use loopgate::error::LoopError;
use loopgate::provider::anthropic::AnthropicProvider;
use loopgate::provider::{CompletionProvider, CompletionRequest, ToolDeclaration};
use loopgate::tools::ToolRegistry;
use loopgate::types::{ProviderEvent, ProviderMessage, ToolCall};

fn sse(events: &[serde_json::Value]) -> String {
    events
        .iter()
        .map(|e| format!("event: {}\ndata: {}\n\n", e["type"].as_str().unwrap(), e))
        .collect()
}

fn request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![ProviderMessage::user("list files in /tmp")],
        system_prompt: "be brief".into(),
        tools: Some(vec![ToolDeclaration {
            name: "file_list".into(),
            description: "List a directory".into(),
            input_schema: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        }]),
    }
}

async fn provider_for(server: &MockServer) -> AnthropicProvider {
    AnthropicProvider::new(
        "claude-test".into(),
        "test-key".into(),
        Some(format!("{}/v1", server.uri())),
        512,
    )
}

async fn drain(provider: &AnthropicProvider) -> Vec<ProviderEvent> {
    provider
        .stream(&request())
        .await
        .unwrap()
        .map(|event| event.unwrap())
        .collect()
        .await
}

#[tokio::test]
async fn streams_text_and_tool_use() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"type": "message_start", "message": {"id": "msg_1"}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Checking "}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "now."}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "file_list", "input": {}}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"path\": "}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"/tmp\"}"}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}}),
        json!({"type": "message_stop"}),
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-test",
            "stream": true,
            "system": "be brief",
            "tools": [{"name": "file_list"}]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let events = drain(&provider_for(&server).await).await;

    assert_eq!(
        events,
        vec![
            ProviderEvent::ContentDelta("Checking ".into()),
            ProviderEvent::ContentDelta("now.".into()),
            ProviderEvent::ToolUse(ToolCall {
                id: "toolu_1".into(),
                name: "file_list".into(),
                input: json!({"path": "/tmp"}),
            }),
            ProviderEvent::Done,
        ]
    );
}

#[tokio::test]
async fn stream_error_frame_becomes_error_event() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"type": "message_start", "message": {"id": "msg_1"}}),
        json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let events = drain(&provider_for(&server).await).await;

    assert_eq!(events, vec![ProviderEvent::Error("Overloaded".into())]);
}

#[tokio::test]
async fn truncated_stream_ends_with_stream_error() {
    let server = MockServer::start().await;
    let body = sse(&[json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "partial"}})]);
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let items: Vec<_> = provider_for(&server)
        .await
        .stream(&request())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert!(matches!(&items[0], Ok(ProviderEvent::ContentDelta(t)) if t == "partial"));
    assert!(matches!(&items[1], Err(LoopError::Stream(m)) if m.contains("message_stop")));
}

#[tokio::test]
async fn final_frame_without_newline_is_parsed() {
    let server = MockServer::start().await;
    let mut body = sse(&[json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "done"}})]);
    body.push_str(r#"data: {"type":"message_stop"}"#);
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let events = drain(&provider_for(&server).await).await;

    assert_eq!(
        events,
        vec![ProviderEvent::ContentDelta("done".into()), ProviderEvent::Done]
    );
}

#[tokio::test]
async fn cut_connection_fails_the_turn_without_saving() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"type": "message_start", "message": {"id": "msg_1"}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "I will now dele"}}),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
    let tool_loop = ToolLoop::builder()
        .provider(Arc::new(provider_for(&server).await))
        .registry(Arc::new(ToolRegistry::new()))
        .store(Arc::clone(&store))
        .build();
    let agent = Arc::new(ChatAgent::new(Arc::new(tool_loop), "sys"));
    let conv = store.create_conversation(None).await.unwrap();

    let events: Vec<StreamEvent> = agent.initiate(conv.id, "clean up".into()).collect().await;

    let kinds: Vec<_> = events.iter().map(StreamEvent::kind).collect();
    assert_eq!(kinds, vec!["message_saved", "content", "error"]);
    let senders: Vec<_> = store
        .list_messages(conv.id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.sender)
        .collect();
    assert_eq!(senders, vec![Sender::User]);
}

#[tokio::test]
async fn configured_rules_warn_on_served_reply() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "As an AI, I cannot."}}),
        json!({"type": "message_stop"}),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let mut config = LoopConfig {
        api_key: Some("test-key".into()),
        base_url: Some(format!("{}/v1", server.uri())),
        workspace_root: dir.path().to_path_buf(),
        ..LoopConfig::default()
    };
    config.response.forbidden_phrases = vec!["as an ai".into()];
    let agent = Arc::new(ChatAgent::from_config(&config).unwrap());
    let conv = agent.store().create_conversation(None).await.unwrap();

    let events: Vec<StreamEvent> = agent.initiate(conv.id, "help".into()).collect().await;

    let kinds: Vec<_> = events.iter().map(StreamEvent::kind).collect();
    assert_eq!(kinds, vec!["message_saved", "content", "warning", "done"]);
    assert!(matches!(&events[2], StreamEvent::Warning { text } if text.contains("as an ai")));
}

#[tokio::test]
async fn unauthorized_maps_to_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .mount(&server)
        .await;

    let result = provider_for(&server).await.stream(&request()).await;

    assert!(matches!(result, Err(LoopError::Authentication(_))));
}

#[tokio::test]
async fn server_error_carries_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .await
        .stream(&request())
        .await
        .err()
        .unwrap();

    match err {
        LoopError::Api { status, message } => {
            assert_eq!(status, 529);
            assert_eq!(message, "Overloaded");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}
