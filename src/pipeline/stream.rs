//! Streaming adaptation between a provider's chunk channel and the client
//! writer: dialect conversion, usage capture, quota recording, cancellation
//! handling, and upstream release.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::convert::StreamConverter;
use crate::error::GatewayError;
use crate::hooks::HookRegistry;
use crate::metrics::GatewayMetrics;
use crate::quota::QuotaLedger;
use crate::wire::chat::{ChatCompletionChunk, ChatUsage};
use crate::wire::semantic::{ResponseUsage, StreamEvent};
use crate::wire::{CloseHandle, Dialect, StreamChunk, StreamProducer, StreamingResponse};

/// Everything the adapter task needs from the pipeline.
pub(crate) struct StreamContext {
    pub ctx: RequestContext,
    pub dialect: Dialect,
    pub model: String,
    pub hooks: HookRegistry,
    pub quota: Arc<QuotaLedger>,
    pub metrics: Arc<GatewayMetrics>,
    pub upstream: StreamingResponse,
}

/// Wraps a provider stream in the pipeline's adapter task and returns the
/// client-facing stream. The downstream close handle is the upstream one,
/// so closing the adapted stream releases the upstream connection.
pub(crate) fn adapt_stream(context: StreamContext) -> StreamingResponse {
    let close = context.upstream.close_handle();
    let (producer, downstream) = StreamingResponse::channel(close.clone());
    tokio::spawn(run(context, producer, close));
    downstream
}

enum Drive {
    /// Upstream finished cleanly; `usage` is `(input, output, total)`.
    Completed { usage: Option<(u64, u64, u64)> },
    Failed(GatewayError),
    Cancelled,
    /// The client-side consumer went away mid-stream.
    ClientGone,
}

async fn run(context: StreamContext, producer: StreamProducer, close: CloseHandle) {
    let StreamContext {
        ctx,
        dialect,
        model,
        hooks,
        quota,
        metrics,
        mut upstream,
    } = context;

    let mut converter = match dialect {
        Dialect::Semantic => Some(StreamConverter::new(&model)),
        _ => None,
    };

    let outcome = drive(&ctx, &mut upstream, &mut converter, &producer).await;

    match outcome {
        Drive::Completed { usage } => {
            if !ctx.is_cancelled() {
                if let Some((input, output, total)) = usage {
                    quota.record(&ctx.tenant_key(), input, output, total);
                }
            }
        }
        Drive::Failed(error) => {
            hooks.notify_error(&ctx, &error).await;
        }
        Drive::Cancelled => {
            debug!(request_id = %ctx.request_id(), "stream cancelled by client");
        }
        Drive::ClientGone => {}
    }

    // Release the upstream connection on every exit path.
    close.close();
    metrics.stream_closed();
}

async fn drive(
    ctx: &RequestContext,
    upstream: &mut StreamingResponse,
    converter: &mut Option<StreamConverter>,
    producer: &StreamProducer,
) -> Drive {
    let mut chat_usage: Option<ChatUsage> = None;
    let mut semantic_usage: Option<ResponseUsage> = None;

    if let Some(conv) = converter.as_mut() {
        for event in conv.begin() {
            if !producer.send(StreamChunk::Semantic(event)).await {
                return Drive::ClientGone;
            }
        }
    }

    loop {
        let chunk = tokio::select! {
            _ = ctx.cancel_token().cancelled() => {
                // Drain whatever the producer managed to queue, then stop.
                while upstream.chunks.try_recv().is_ok() {}
                return Drive::Cancelled;
            }
            chunk = upstream.chunks.recv() => chunk,
        };

        let Some(chunk) = chunk else {
            // Producer dropped without a terminator; fall through to the
            // terminal handling so a pending error is still surfaced.
            break;
        };

        match chunk {
            StreamChunk::ChatRaw(bytes) => {
                match serde_json::from_slice::<ChatCompletionChunk>(&bytes) {
                    Ok(parsed) => {
                        if let Some(usage) = parsed.usage {
                            chat_usage = Some(usage);
                        }
                        if let Some(conv) = converter.as_mut() {
                            for event in conv.on_chunk(&parsed) {
                                if !producer.send(StreamChunk::Semantic(event)).await {
                                    return Drive::ClientGone;
                                }
                            }
                        } else if !producer.send(StreamChunk::ChatRaw(bytes)).await {
                            return Drive::ClientGone;
                        }
                    }
                    Err(error) => {
                        // Do not abort the stream over one bad chunk.
                        warn!(%error, "dropping unparseable upstream chunk");
                    }
                }
            }
            StreamChunk::Semantic(event) => {
                if let StreamEvent::ResponseCompleted { response, .. } = &event {
                    semantic_usage = response.usage;
                }
                if !producer.send(StreamChunk::Semantic(event)).await {
                    return Drive::ClientGone;
                }
            }
            StreamChunk::Done => break,
        }
    }

    if let Ok(error) = upstream.errors.try_recv() {
        if let Some(conv) = converter.as_mut() {
            for event in conv.fail(&error) {
                if !producer.send(StreamChunk::Semantic(event)).await {
                    return Drive::ClientGone;
                }
            }
            producer.finish().await;
        } else {
            producer.fail(error.clone()).await;
        }
        return Drive::Failed(error);
    }

    if let Some(conv) = converter.as_mut() {
        for event in conv.finish() {
            if !producer.send(StreamChunk::Semantic(event)).await {
                return Drive::ClientGone;
            }
        }
    }
    producer.finish().await;

    let usage = if let Some(conv) = converter.as_ref() {
        let usage = conv.usage().unwrap_or_default();
        Some((usage.input_tokens, usage.output_tokens, usage.total_tokens))
    } else if let Some(usage) = semantic_usage {
        Some((usage.input_tokens, usage.output_tokens, usage.total_tokens))
    } else {
        chat_usage.map(|u| (u.prompt_tokens, u.completion_tokens, u.total_tokens))
    };
    Drive::Completed { usage }
}
