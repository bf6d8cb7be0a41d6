//! Client-facing SSE body construction.
//!
//! Wraps an adapted stream in an `text/event-stream` body: semantic events
//! are framed by the writer, chat chunks pass through as bare data frames,
//! chunk hooks run between converter and writer, and a drop guard cancels
//! the request context when the client disconnects mid-stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::pipeline::Gateway;
use crate::sse::SseWriter;
use crate::wire::semantic::StreamEvent;
use crate::wire::{CloseHandle, StreamChunk, StreamingResponse};

/// Cancels the request and releases the upstream when the body stream is
/// dropped, which is how a client disconnect manifests here.
struct DisconnectGuard {
    ctx: RequestContext,
    close: CloseHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.ctx.cancel();
        self.close.close();
    }
}

struct WriterState {
    ctx: RequestContext,
    gateway: Arc<Gateway>,
    chunks: mpsc::Receiver<StreamChunk>,
    errors: mpsc::Receiver<GatewayError>,
    writer: SseWriter,
    finished: bool,
    _guard: DisconnectGuard,
}

impl WriterState {
    /// Serializes one semantic event through the chunk hooks into a frame.
    async fn event_frame(&mut self, event: &mut StreamEvent) -> Result<Bytes, GatewayError> {
        let (name, data) = self.writer.serialize(event)?;
        let data = self.gateway.hooks().apply_chunk(&self.ctx, data).await?;
        Ok(SseWriter::frame(name, &data))
    }

    /// Threads a raw chat payload through the chunk hooks into a frame.
    async fn raw_frame(&mut self, data: Bytes) -> Result<Bytes, GatewayError> {
        let data = self.gateway.hooks().apply_chunk(&self.ctx, data).await?;
        Ok(SseWriter::data_frame(&data))
    }

    /// Terminal failure: an `error` event followed by `[DONE]`.
    fn error_then_done(&mut self, error: &GatewayError) -> Bytes {
        let mut event = StreamEvent::Error {
            sequence_number: 0,
            code: Some(
                error
                    .error_code()
                    .unwrap_or_else(|| error.error_type())
                    .to_string(),
            ),
            message: error.to_string(),
            param: error.error_param().map(str::to_string),
        };
        let mut out = Vec::new();
        if let Ok((name, data)) = self.writer.serialize(&mut event) {
            out.extend_from_slice(&SseWriter::frame(name, &data));
        }
        out.extend_from_slice(&SseWriter::done_frame());
        Bytes::from(out)
    }
}

/// Builds the streaming HTTP response for an adapted stream.
pub(crate) fn sse_response(
    ctx: RequestContext,
    gateway: Arc<Gateway>,
    response: StreamingResponse,
) -> Response {
    let request_id = ctx.request_id().to_string();
    let close = response.close_handle();
    let state = WriterState {
        ctx: ctx.clone(),
        gateway,
        chunks: response.chunks,
        errors: response.errors,
        writer: SseWriter::new(),
        finished: false,
        _guard: DisconnectGuard { ctx, close },
    };

    let frames = futures_util::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        match state.chunks.recv().await {
            Some(StreamChunk::Semantic(mut event)) => match state.event_frame(&mut event).await {
                Ok(frame) => Some((Ok::<Bytes, Infallible>(frame), state)),
                Err(error) => {
                    state.finished = true;
                    let frame = state.error_then_done(&error);
                    Some((Ok(frame), state))
                }
            },
            Some(StreamChunk::ChatRaw(bytes)) => match state.raw_frame(bytes).await {
                Ok(frame) => Some((Ok(frame), state)),
                Err(error) => {
                    state.finished = true;
                    let frame = state.error_then_done(&error);
                    Some((Ok(frame), state))
                }
            },
            Some(StreamChunk::Done) => {
                state.finished = true;
                if let Ok(error) = state.errors.try_recv() {
                    let frame = state.error_then_done(&error);
                    return Some((Ok(frame), state));
                }
                Some((Ok(SseWriter::done_frame()), state))
            }
            None => {
                state.finished = true;
                let error = state
                    .errors
                    .try_recv()
                    .unwrap_or_else(|_| GatewayError::internal("stream terminated unexpectedly"));
                let frame = state.error_then_done(&error);
                Some((Ok(frame), state))
            }
        }
    });

    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    if let Ok(value) = header::HeaderValue::from_str(&request_id) {
        headers.insert(header::HeaderName::from_static("x-request-id"), value);
    }

    (StatusCode::OK, headers, Body::from_stream(frames)).into_response()
}
