//! HTTP/SSE surface through the axum router.
#![cfg(feature = "server")]

mod common;

use std::net::SocketAddr;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::*;
use loopgate::agent_loop::StreamEvent;
use loopgate::server::build_router;

fn router(h: &Harness) -> Router {
    let addr: SocketAddr = "127.0.0.1:8787".parse().unwrap();
    build_router(h.agent.clone(), addr)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Every `data:` payload of an SSE response, parsed as JSON.
async fn sse_frames(response: axum::response::Response) -> Vec<Value> {
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect()
}

#[tokio::test]
async fn health_reports_ok() {
    let h = Harness::new();
    let response = router(&h)
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn tools_list_risk_levels() {
    let h = Harness::new();
    let response = router(&h)
        .oneshot(Request::get("/api/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let tools = body_json(response).await;
    let summary: Vec<(String, u64, bool)> = tools
        .as_array()
        .unwrap()
        .iter()
        .map(|t| {
            (
                t["name"].as_str().unwrap().to_string(),
                t["riskLevel"].as_u64().unwrap(),
                t["requiresApproval"].as_bool().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("file_list".to_string(), 1, false),
            ("file_write".to_string(), 2, true),
            ("shell_exec".to_string(), 3, true),
        ]
    );
}

#[tokio::test]
async fn create_conversation_returns_created() {
    let h = Harness::new();
    let response = router(&h)
        .oneshot(post_json("/api/conversations", json!({"title": "ops"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["title"], "ops");
    let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    assert!(h.store.get_conversation_by_id(id).await.unwrap().is_some());
}

#[tokio::test]
async fn ending_unknown_conversation_is_not_found() {
    let h = Harness::new();
    let uri = format!("/api/conversations/{}/end", Uuid::new_v4());
    let response = router(&h)
        .oneshot(Request::post(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("not found"));
}

#[tokio::test]
async fn chat_stream_emits_wire_envelopes() {
    let h = Harness::new();
    let conv = h.conversation().await;
    h.provider.queue_text("Hi!");

    let response = router(&h)
        .oneshot(post_json(
            "/api/chat/stream",
            json!({"conversationId": conv.id, "content": "hello"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let frames = sse_frames(response).await;
    let types: Vec<_> = frames.iter().map(|f| f["type"].as_str().unwrap()).collect();
    assert_eq!(types, vec!["message_saved", "content", "content", "done"]);
    assert_eq!(frames[1], json!({"type": "content", "data": "H"}));
    let saved = h.agent_messages(conv.id).await;
    assert_eq!(frames[3]["messageId"], saved[0].id.to_string());
}

#[tokio::test]
async fn approval_round_trip_over_http() {
    let h = Harness::new();
    let conv = h.conversation().await;
    h.provider
        .queue_tool_call("toolu_9", "shell_exec", json!({"command": "rm -rf logs"}));
    h.provider.queue_text("Deleted.");
    let app = router(&h);

    let first = sse_frames(
        app.clone()
            .oneshot(post_json(
                "/api/chat/stream",
                json!({"conversationId": conv.id, "content": "delete all logs"}),
            ))
            .await
            .unwrap(),
    )
    .await;
    let approval = first.last().unwrap();
    assert_eq!(approval["type"], "tool_approval");
    assert_eq!(approval["toolApproval"]["riskLevel"], 3);
    assert_eq!(approval["toolApproval"]["toolName"], "shell_exec");
    let approval_id = approval["toolApproval"]["id"].as_str().unwrap().to_string();

    let pending = body_json(
        app.clone()
            .oneshot(
                Request::get(format!("/api/conversations/{}/approvals", conv.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(pending[0]["id"], approval_id.as_str());

    let resumed = sse_frames(
        app.oneshot(post_json(
            "/api/chat/approve",
            json!({"approvalId": approval_id, "approved": true}),
        ))
        .await
        .unwrap(),
    )
    .await;
    let events: Vec<StreamEvent> = resumed
        .into_iter()
        .map(|frame| serde_json::from_value(frame).unwrap())
        .collect();
    assert_eq!(
        kinds(&events),
        vec!["tool_result", "content", "content", "done"]
    );
    assert_eq!(h.counters.shell_runs(), 1);
}

#[tokio::test]
async fn unknown_conversation_streams_single_error() {
    let h = Harness::new();
    let response = router(&h)
        .oneshot(post_json(
            "/api/chat/stream",
            json!({"conversationId": Uuid::new_v4(), "content": "hello"}),
        ))
        .await
        .unwrap();

    let frames = sse_frames(response).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
    assert_eq!(h.provider.call_count(), 0);
}
