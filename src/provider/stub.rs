//! Canned provider for tests and examples.
//!
//! Plays back a fixed batched response or a scripted chunk sequence,
//! honoring cancellation and the close-handle contract the same way the
//! HTTP provider does.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::context::RequestContext;
use crate::convert;
use crate::error::GatewayError;
use crate::provider::Provider;
use crate::wire::{
    Api, ApiSet, BatchedPayload, ChatCompletionChunk, ChatCompletionResponse, CloseHandle,
    Dialect, EmbeddingsResponse, ImagesResponse, RequestPayload, StreamChunk, StreamProducer,
    StreamingResponse, UnifiedRequest, UnifiedResponse,
};

/// A provider that replays canned responses.
pub struct StaticProvider {
    name: String,
    apis: ApiSet,
    chat_response: Option<ChatCompletionResponse>,
    chunks: Vec<ChatCompletionChunk>,
    chunk_delay: Duration,
    stream_error_after: Option<(usize, GatewayError)>,
    embeddings: Option<EmbeddingsResponse>,
    images: Option<ImagesResponse>,
    fail_with: Option<GatewayError>,
    closes: Arc<AtomicUsize>,
}

impl StaticProvider {
    /// A chat-only stub with no scripted responses.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            apis: ApiSet::chat_only(),
            chat_response: None,
            chunks: Vec::new(),
            chunk_delay: Duration::ZERO,
            stream_error_after: None,
            embeddings: None,
            images: None,
            fail_with: None,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Declares the APIs the stub claims to support.
    pub fn with_apis(mut self, apis: ApiSet) -> Self {
        self.apis = apis;
        self
    }

    /// Scripted batched chat response.
    pub fn with_chat_response(mut self, response: ChatCompletionResponse) -> Self {
        self.chat_response = Some(response);
        self
    }

    /// Scripted streaming chunks, replayed in order.
    pub fn with_chunks(mut self, chunks: Vec<ChatCompletionChunk>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Delay inserted before each streamed chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Fails the stream after `after` chunks have been delivered.
    pub fn with_stream_error_after(mut self, after: usize, error: GatewayError) -> Self {
        self.stream_error_after = Some((after, error));
        self
    }

    /// Scripted embeddings response.
    pub fn with_embeddings(mut self, response: EmbeddingsResponse) -> Self {
        self.embeddings = Some(response);
        self
    }

    /// Scripted images response.
    pub fn with_images(mut self, response: ImagesResponse) -> Self {
        self.images = Some(response);
        self
    }

    /// Makes every call fail with `error`.
    pub fn failing(mut self, error: GatewayError) -> Self {
        self.fail_with = Some(error);
        self
    }

    /// How many times a stream's close handle has fired.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Shared counter handle, for asserting after the provider moved.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }

    fn scripted_chat(&self) -> Result<ChatCompletionResponse, GatewayError> {
        self.chat_response
            .clone()
            .ok_or_else(|| GatewayError::Internal("stub has no scripted chat response".to_string()))
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_apis(&self) -> ApiSet {
        self.apis
    }

    async fn send_request(
        &self,
        ctx: &RequestContext,
        request: &UnifiedRequest,
    ) -> Result<UnifiedResponse, GatewayError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }

        match request.dialect {
            Dialect::Chat | Dialect::Semantic => {}
            Dialect::Embeddings => {
                let response = self.embeddings.clone().unwrap_or(EmbeddingsResponse {
                    object: "list".to_string(),
                    data: Vec::new(),
                    model: request.model.clone(),
                    usage: None,
                });
                return Ok(UnifiedResponse::Batched(BatchedPayload::Embeddings(response)));
            }
            Dialect::Images => {
                let response = self.images.clone().unwrap_or(ImagesResponse {
                    created: chrono::Utc::now().timestamp(),
                    data: Vec::new(),
                });
                return Ok(UnifiedResponse::Batched(BatchedPayload::Images(response)));
            }
            Dialect::Models => {
                return Err(GatewayError::Internal(
                    "model listing is served by the registry, not a provider".to_string(),
                ));
            }
        }

        // Mirror the HTTP provider: a semantic request against a chat-only
        // stub goes through request conversion so its validation errors
        // (missing input, no surviving messages) surface identically.
        if let RequestPayload::Semantic(semantic) = &request.payload {
            if !self.apis.contains(Api::Semantic) {
                convert::semantic_to_chat_request(semantic)?;
            }
        }

        if request.streaming {
            let child = ctx.cancel_token().child_token();
            let closes = self.closes.clone();
            let close = CloseHandle::with_callback(child.clone(), move || {
                closes.fetch_add(1, Ordering::SeqCst);
            });
            let (producer, streaming) = StreamingResponse::channel(close);
            let script = self.chunks.clone();
            let delay = self.chunk_delay;
            let error_after = self.stream_error_after.clone();
            tokio::spawn(async move {
                replay_chunks(producer, child, script, delay, error_after).await;
            });
            return Ok(UnifiedResponse::Streaming(streaming));
        }

        let chat = self.scripted_chat()?;
        match (&request.payload, request.dialect) {
            (_, Dialect::Chat) => Ok(UnifiedResponse::Batched(BatchedPayload::Chat(chat))),
            (RequestPayload::Semantic(origin), Dialect::Semantic) => {
                let semantic = convert::chat_to_semantic_response(&chat, Some(origin));
                Ok(UnifiedResponse::Batched(BatchedPayload::Semantic(semantic)))
            }
            _ => Err(GatewayError::Internal(
                "stub dispatched with inconsistent payload".to_string(),
            )),
        }
    }
}

async fn replay_chunks(
    producer: StreamProducer,
    cancel: tokio_util::sync::CancellationToken,
    script: Vec<ChatCompletionChunk>,
    delay: Duration,
    error_after: Option<(usize, GatewayError)>,
) {
    for (index, chunk) in script.into_iter().enumerate() {
        if let Some((after, error)) = &error_after {
            if index == *after {
                producer.fail(error.clone()).await;
                return;
            }
        }
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let Ok(bytes) = serde_json::to_vec(&chunk) else {
            producer
                .fail(GatewayError::internal("stub chunk serialization failed"))
                .await;
            return;
        };
        let sent = tokio::select! {
            _ = cancel.cancelled() => return,
            sent = producer.send(StreamChunk::ChatRaw(Bytes::from(bytes))) => sent,
        };
        if !sent {
            return;
        }
    }
    if let Some((_, error)) = error_after {
        // Failure point at or past the end of the script.
        producer.fail(error).await;
        return;
    }
    producer.finish().await;
}
