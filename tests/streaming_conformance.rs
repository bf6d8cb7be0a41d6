//! Streaming conformance: event sequences, terminators, error frames, and
//! cancellation behavior.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{delta_script, gateway_for, parse_sse, post_text};
use crossbar::wire::{StreamChunk, UnifiedRequest, UnifiedResponse};
use crossbar::{
    Gateway, GatewayError, QuotaConfig, QuotaPeriod, RequestContext, StaticProvider,
    server,
};

fn streaming_provider(deltas: &[&str]) -> StaticProvider {
    StaticProvider::new("stub").with_chunks(delta_script(deltas))
}

#[tokio::test]
async fn semantic_stream_emits_the_full_event_sequence() {
    let gateway = gateway_for("gpt-4", Arc::new(streaming_provider(&["He", "llo"])));
    let app = server::router(gateway);

    let (status, body) = post_text(
        &app,
        "/v1/responses",
        json!({
            "model": "gpt-4",
            "input": [{"type": "message", "role": "user", "content": "Hi"}],
            "stream": true
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert!(body.starts_with("event: response.created\n"));
    assert!(body.trim_end().ends_with("data: [DONE]"));

    let frames = parse_sse(&body);
    let names: Vec<&str> = frames
        .iter()
        .map(|(event, _)| event.as_deref().unwrap_or(""))
        .collect();
    assert_eq!(
        names,
        vec![
            "response.created",
            "response.in_progress",
            "response.output_item.added",
            "response.content_part.added",
            "response.output_text.delta",
            "response.output_text.delta",
            "response.output_text.done",
            "response.output_item.done",
            "response.completed",
        ]
    );

    // The event name matches the `type` field and sequence numbers increase
    // by exactly one.
    let mut previous = 0;
    for (event, data) in &frames {
        assert_eq!(data["type"].as_str(), event.as_deref());
        let sequence = data["sequence_number"].as_u64().unwrap();
        assert_eq!(sequence, previous + 1);
        previous = sequence;
    }

    let done = frames
        .iter()
        .find(|(event, _)| event.as_deref() == Some("response.output_text.done"))
        .unwrap();
    assert_eq!(done.1["text"], "Hello");

    let deltas: Vec<&str> = frames
        .iter()
        .filter(|(event, _)| event.as_deref() == Some("response.output_text.delta"))
        .map(|(_, data)| data["delta"].as_str().unwrap())
        .collect();
    assert_eq!(deltas, vec!["He", "llo"]);

    let completed = &frames.last().unwrap().1;
    assert_eq!(completed["response"]["status"], "completed");
    assert_eq!(completed["response"]["usage"]["total_tokens"], 3);
}

#[tokio::test]
async fn chat_stream_passes_chunks_through_verbatim() {
    let gateway = gateway_for("gpt-4", Arc::new(streaming_provider(&["He", "llo"])));
    let app = server::router(gateway);

    let (status, body) = post_text(
        &app,
        "/v1/chat/completions",
        json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert!(body.trim_end().ends_with("data: [DONE]"));

    let frames = parse_sse(&body);
    // Two deltas, a finish chunk, and a usage chunk; all unnamed data frames.
    assert_eq!(frames.len(), 4);
    assert!(frames.iter().all(|(event, _)| event.is_none()));
    assert_eq!(frames[0].1["choices"][0]["delta"]["content"], "He");
    assert_eq!(frames[1].1["choices"][0]["delta"]["content"], "llo");
    assert_eq!(frames[2].1["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn upstream_error_becomes_error_event_then_done() {
    let provider = StaticProvider::new("stub")
        .with_chunks(delta_script(&["He"]))
        .with_stream_error_after(
            1,
            GatewayError::Upstream {
                status: Some(502),
                message: "upstream fell over".into(),
            },
        );
    let gateway = gateway_for("gpt-4", Arc::new(provider));
    let app = server::router(gateway);

    let (status, body) = post_text(
        &app,
        "/v1/responses",
        json!({"model": "gpt-4", "input": "Hi", "stream": true}),
    )
    .await;

    assert_eq!(status, 200);
    assert!(body.trim_end().ends_with("data: [DONE]"));

    let frames = parse_sse(&body);
    let names: Vec<&str> = frames
        .iter()
        .map(|(event, _)| event.as_deref().unwrap_or(""))
        .collect();
    // The delta made it out, the failure is an error event, and no
    // response.completed is ever written.
    assert!(names.contains(&"response.output_text.delta"));
    assert!(names.contains(&"error"));
    assert!(!names.contains(&"response.completed"));
    assert_eq!(names.last(), Some(&"error"));

    let error = frames.last().unwrap();
    assert!(
        error.1["message"]
            .as_str()
            .unwrap()
            .contains("upstream fell over")
    );
}

#[tokio::test]
async fn quota_is_recorded_for_completed_streams() {
    let provider = Arc::new(streaming_provider(&["He", "llo"]));
    let gateway = Gateway::builder()
        .model("gpt-4", provider)
        .quota(QuotaConfig {
            enabled: true,
            default_quota: 1_000,
            period: QuotaPeriod::Never,
        })
        .build();
    let app = server::router(gateway.clone());

    let (status, _) = post_text(
        &app,
        "/v1/responses",
        json!({"model": "gpt-4", "input": "Hi", "stream": true}),
    )
    .await;
    assert_eq!(status, 200);

    // The adapter records after the stream drains; give it a beat.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let usage = gateway.quota().get_usage("anonymous").unwrap();
    assert_eq!(usage.total_tokens, 3);
    assert_eq!(usage.input_tokens, 1);
    assert_eq!(usage.output_tokens, 2);
}

#[tokio::test]
async fn cancellation_closes_upstream_once_and_records_nothing() {
    let provider = StaticProvider::new("stub")
        .with_chunks(delta_script(&["He", "llo", "!", "more", "text"]))
        .with_chunk_delay(Duration::from_millis(20));
    let closes = provider.close_counter();

    let gateway = Gateway::builder()
        .model("gpt-4", Arc::new(provider))
        .quota(QuotaConfig {
            enabled: true,
            default_quota: 1_000,
            period: QuotaPeriod::Never,
        })
        .build();

    let ctx = RequestContext::new(None);
    let request: crossbar::wire::ResponsesRequest = serde_json::from_value(json!({
        "model": "gpt-4",
        "input": "Hi",
        "stream": true
    }))
    .unwrap();

    let response = gateway
        .handle(&ctx, UnifiedRequest::semantic(request))
        .await
        .unwrap();
    let UnifiedResponse::Streaming(mut stream) = response else {
        panic!("expected streaming response");
    };

    // Read until the first text delta, then walk away.
    let mut saw_delta = false;
    while let Some(chunk) = stream.chunks.recv().await {
        if let StreamChunk::Semantic(event) = &chunk {
            if event.event_type() == "response.output_text.delta" {
                saw_delta = true;
                break;
            }
        }
    }
    assert!(saw_delta);

    ctx.cancel();
    drop(stream);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The close callback ran exactly once and no usage was recorded.
    assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(gateway.quota().get_usage("anonymous").is_none());
}

#[tokio::test]
async fn stream_hooks_rewrite_outbound_chunks() {
    use async_trait::async_trait;
    use bytes::Bytes;
    use crossbar::hooks::StreamHook;

    struct Redactor;

    #[async_trait]
    impl StreamHook for Redactor {
        async fn on_chunk(
            &self,
            _ctx: &RequestContext,
            chunk: Bytes,
        ) -> Result<Bytes, GatewayError> {
            let text = String::from_utf8_lossy(&chunk).replace("Hello", "******");
            Ok(Bytes::from(text.into_bytes()))
        }
    }

    let gateway = Gateway::builder()
        .model("gpt-4", Arc::new(streaming_provider(&["Hello"])))
        .stream_hook(Arc::new(Redactor))
        .build();
    let app = server::router(gateway);

    let (status, body) = post_text(
        &app,
        "/v1/responses",
        json!({"model": "gpt-4", "input": "Hi", "stream": true}),
    )
    .await;

    assert_eq!(status, 200);
    assert!(!body.contains("Hello"));
    assert!(body.contains("******"));
}
