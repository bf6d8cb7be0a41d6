//! Shared harness for gateway integration tests.

// Each test binary uses a different subset of the harness.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use crossbar::provider::Provider;
use crossbar::wire::{ChatCompletionChunk, ChatCompletionResponse};
use crossbar::{Gateway, StaticProvider};

/// A canned batched chat response with the given assistant content.
pub fn chat_response(content: &str) -> ChatCompletionResponse {
    serde_json::from_value(json!({
        "id": "chatcmpl-stub",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
    }))
    .unwrap()
}

/// Content deltas followed by a `stop` chunk and a usage chunk.
pub fn delta_script(deltas: &[&str]) -> Vec<ChatCompletionChunk> {
    let mut chunks: Vec<ChatCompletionChunk> = deltas
        .iter()
        .map(|delta| {
            serde_json::from_value(json!({
                "id": "chatcmpl-stub",
                "object": "chat.completion.chunk",
                "created": 1_700_000_000,
                "model": "gpt-4",
                "choices": [{"index": 0, "delta": {"content": delta}, "finish_reason": null}]
            }))
            .unwrap()
        })
        .collect();
    chunks.push(
        serde_json::from_value(json!({
            "id": "chatcmpl-stub",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "gpt-4",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        }))
        .unwrap(),
    );
    chunks.push(
        serde_json::from_value(json!({
            "id": "chatcmpl-stub",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "gpt-4",
            "choices": [],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        }))
        .unwrap(),
    );
    chunks
}

/// A stub provider whose batched reply says `content`.
pub fn stub_provider(content: &str) -> StaticProvider {
    StaticProvider::new("stub").with_chat_response(chat_response(content))
}

/// A gateway routing `model` to `provider`, with permissive controls.
pub fn gateway_for(model: &str, provider: Arc<dyn Provider>) -> Arc<Gateway> {
    Gateway::builder().model(model, provider).build()
}

/// POSTs a JSON body and returns `(status, parsed body)`.
pub async fn post_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let parsed = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, parsed)
}

/// POSTs a JSON body and returns `(status, raw body text)` for SSE checks.
pub async fn post_text(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

/// GETs a path and returns `(status, raw body text)`.
pub async fn get_text(app: &Router, path: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

/// GETs a path and returns `(status, parsed body)`.
pub async fn get_json(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let parsed = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, parsed)
}

/// Splits an SSE body into `(event-name, data-json)` frames, excluding the
/// `[DONE]` terminator (whose presence is asserted separately).
pub fn parse_sse(body: &str) -> Vec<(Option<String>, serde_json::Value)> {
    let mut frames = Vec::new();
    for block in body.split("\n\n").filter(|b| !b.trim().is_empty()) {
        let mut event = None;
        let mut data = Vec::new();
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event: ") {
                event = Some(value.to_string());
            } else if let Some(value) = line.strip_prefix("data: ") {
                data.push(value.to_string());
            }
        }
        let data = data.join("\n");
        if data == "[DONE]" {
            continue;
        }
        let parsed = serde_json::from_str(&data).unwrap_or(serde_json::Value::Null);
        frames.push((event, parsed));
    }
    frames
}
