//! HTTP provider: serializes unified requests to the OpenAI wire format,
//! calls the upstream through the retrying transport, and decodes batched
//! or streamed responses.
//!
//! When the requested API is not in the provider's declared set, the
//! request is converted to the chat dialect before dispatch. Batched
//! responses convert back here; streamed chunks flow out raw and the
//! pipeline's per-response converter re-frames them.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::context::RequestContext;
use crate::convert;
use crate::error::GatewayError;
use crate::provider::Provider;
use crate::sse::SseDecoder;
use crate::transport::{CallerConfig, HttpCaller};
use crate::wire::chat::StreamOptions;
use crate::wire::semantic::StreamEvent;
use crate::wire::{
    Api, ApiSet, BatchedPayload, CloseHandle, Dialect, RequestPayload, StreamChunk,
    StreamProducer, StreamingResponse, UnifiedRequest, UnifiedResponse,
};

/// Configuration for one HTTP upstream.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub name: String,
    /// Upstream base, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Prefix stripped from the canonical endpoint before it is appended to
    /// `base_url`, for upstreams whose base already contains a version
    /// segment. `/v1` by default.
    pub base_path: String,
    pub api_key: Option<String>,
    pub supported_apis: ApiSet,
    /// Extra headers sent with every upstream call.
    pub headers: HashMap<String, String>,
    pub caller: CallerConfig,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            base_path: "/v1".to_string(),
            api_key: None,
            supported_apis: ApiSet::chat_only()
                .with(Api::Embeddings)
                .with(Api::Images),
            headers: HashMap::new(),
            caller: CallerConfig::default(),
        }
    }
}

/// Which wire shape the upstream exchange uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpstreamDialect {
    Chat,
    Semantic,
}

/// Default provider implementation over HTTP.
pub struct HttpProvider {
    name: String,
    base_url: String,
    base_path: String,
    supported_apis: ApiSet,
    caller: HttpCaller,
    default_headers: HeaderMap,
}

impl HttpProvider {
    /// Builds the provider and its pooled client.
    pub fn new(config: HttpProviderConfig) -> Result<Self, GatewayError> {
        let caller = HttpCaller::new(&config.caller)?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| GatewayError::Internal(format!("invalid api key header: {e}")))?;
            default_headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GatewayError::Internal(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| GatewayError::Internal(format!("invalid header value: {e}")))?;
            default_headers.insert(name, value);
        }

        Ok(Self {
            name: config.name,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            base_path: config.base_path,
            supported_apis: config.supported_apis,
            caller,
            default_headers,
        })
    }

    fn upstream_url(&self, endpoint: &str) -> String {
        let path = if !self.base_path.is_empty() {
            endpoint.strip_prefix(self.base_path.as_str()).unwrap_or(endpoint)
        } else {
            endpoint
        };
        format!("{}{}", self.base_url, path)
    }

    fn headers_for(&self, request: &UnifiedRequest) -> HeaderMap {
        let mut headers = self.default_headers.clone();
        for (name, value) in &request.headers {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            let Ok(value) = HeaderValue::from_str(value) else {
                continue;
            };
            headers.insert(name, value);
        }
        headers
    }

    /// Chooses the upstream dialect and serialized body for a language
    /// request, converting semantic → chat when the upstream cannot speak
    /// the semantic dialect natively.
    fn prepare_language_exchange(
        &self,
        request: &UnifiedRequest,
    ) -> Result<(UpstreamDialect, String, Bytes), GatewayError> {
        match (&request.payload, request.dialect) {
            (RequestPayload::Chat(chat), Dialect::Chat) => {
                if !self.supported_apis.contains(Api::Chat) {
                    return Err(GatewayError::invalid(format!(
                        "provider {} does not support the chat API",
                        self.name
                    )));
                }
                let body = serde_json::to_vec(chat)?;
                Ok((UpstreamDialect::Chat, request.endpoint.clone(), body.into()))
            }
            (RequestPayload::Semantic(semantic), Dialect::Semantic) => {
                if self.supported_apis.contains(Api::Semantic) {
                    let body = serde_json::to_vec(semantic)?;
                    return Ok((UpstreamDialect::Semantic, request.endpoint.clone(), body.into()));
                }
                if !self.supported_apis.contains(Api::Chat) {
                    return Err(GatewayError::invalid(format!(
                        "provider {} supports neither the semantic nor the chat API",
                        self.name
                    )));
                }
                let mut chat = convert::semantic_to_chat_request(semantic)?;
                if request.streaming {
                    chat.stream = Some(true);
                    // Usage arrives on the final chunk only when asked for.
                    chat.stream_options = Some(StreamOptions {
                        include_usage: Some(true),
                    });
                }
                let body = serde_json::to_vec(&chat)?;
                Ok((
                    UpstreamDialect::Chat,
                    "/v1/chat/completions".to_string(),
                    body.into(),
                ))
            }
            _ => Err(GatewayError::Internal(
                "language exchange invoked with a non-language payload".to_string(),
            )),
        }
    }

    async fn send_language(
        &self,
        ctx: &RequestContext,
        request: &UnifiedRequest,
    ) -> Result<UnifiedResponse, GatewayError> {
        let (upstream_dialect, upstream_endpoint, body) =
            self.prepare_language_exchange(request)?;
        let url = self.upstream_url(&upstream_endpoint);
        let headers = self.headers_for(request);

        let response = self
            .caller
            .post(ctx.cancel_token(), &url, body, headers, request.streaming)
            .await?;

        if request.streaming {
            let child = ctx.cancel_token().child_token();
            let close = CloseHandle::new(child.clone());
            let (producer, streaming) = StreamingResponse::channel(close);
            tokio::spawn(pump_sse_body(response, producer, child, upstream_dialect));
            return Ok(UnifiedResponse::Streaming(streaming));
        }

        match (request.dialect, upstream_dialect) {
            (Dialect::Chat, UpstreamDialect::Chat) => {
                let chat = decode_json(response).await?;
                Ok(UnifiedResponse::Batched(BatchedPayload::Chat(chat)))
            }
            (Dialect::Semantic, UpstreamDialect::Semantic) => {
                let semantic = decode_json(response).await?;
                Ok(UnifiedResponse::Batched(BatchedPayload::Semantic(semantic)))
            }
            (Dialect::Semantic, UpstreamDialect::Chat) => {
                let chat: crate::wire::ChatCompletionResponse = decode_json(response).await?;
                let RequestPayload::Semantic(origin) = &request.payload else {
                    return Err(GatewayError::Internal(
                        "semantic dialect without semantic payload".to_string(),
                    ));
                };
                let semantic = convert::chat_to_semantic_response(&chat, Some(origin));
                Ok(UnifiedResponse::Batched(BatchedPayload::Semantic(semantic)))
            }
            _ => Err(GatewayError::Internal(
                "inconsistent dialect pairing after dispatch".to_string(),
            )),
        }
    }

    async fn send_embeddings(
        &self,
        ctx: &RequestContext,
        request: &UnifiedRequest,
    ) -> Result<UnifiedResponse, GatewayError> {
        if !self.supported_apis.contains(Api::Embeddings) {
            return Err(GatewayError::invalid(format!(
                "provider {} does not support the embeddings API",
                self.name
            )));
        }
        let RequestPayload::Embeddings(payload) = &request.payload else {
            return Err(GatewayError::Internal(
                "embeddings dialect without embeddings payload".to_string(),
            ));
        };
        let body = serde_json::to_vec(payload)?;
        let url = self.upstream_url(&request.endpoint);
        let response = self
            .caller
            .post(ctx.cancel_token(), &url, body.into(), self.headers_for(request), false)
            .await?;
        let decoded = decode_json(response).await?;
        Ok(UnifiedResponse::Batched(BatchedPayload::Embeddings(decoded)))
    }

    async fn send_images(
        &self,
        ctx: &RequestContext,
        request: &UnifiedRequest,
    ) -> Result<UnifiedResponse, GatewayError> {
        if !self.supported_apis.contains(Api::Images) {
            return Err(GatewayError::invalid(format!(
                "provider {} does not support the images API",
                self.name
            )));
        }
        let RequestPayload::Images(payload) = &request.payload else {
            return Err(GatewayError::Internal(
                "images dialect without images payload".to_string(),
            ));
        };
        let body = serde_json::to_vec(payload)?;
        let url = self.upstream_url(&request.endpoint);
        let response = self
            .caller
            .post(ctx.cancel_token(), &url, body.into(), self.headers_for(request), false)
            .await?;
        let decoded = decode_json(response).await?;
        Ok(UnifiedResponse::Batched(BatchedPayload::Images(decoded)))
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_apis(&self) -> ApiSet {
        self.supported_apis
    }

    #[instrument(skip(self, ctx, request), fields(provider = %self.name, model = %request.model))]
    async fn send_request(
        &self,
        ctx: &RequestContext,
        request: &UnifiedRequest,
    ) -> Result<UnifiedResponse, GatewayError> {
        match request.dialect {
            Dialect::Chat | Dialect::Semantic => self.send_language(ctx, request).await,
            Dialect::Embeddings => self.send_embeddings(ctx, request).await,
            Dialect::Images => self.send_images(ctx, request).await,
            Dialect::Models => Err(GatewayError::Internal(
                "model listing is served by the registry, not a provider".to_string(),
            )),
        }
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    response.json::<T>().await.map_err(|e| GatewayError::Upstream {
        status: Some(status.as_u16()),
        message: format!("failed to decode upstream response: {e}"),
    })
}

/// Drives the upstream SSE body, pushing one chunk per frame into the
/// response channel. Exits at the next suspension point after cancellation;
/// dropping the body releases the upstream connection.
async fn pump_sse_body(
    response: reqwest::Response,
    producer: StreamProducer,
    cancel: CancellationToken,
    upstream_dialect: UpstreamDialect,
) {
    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("streaming upstream cancelled");
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                for frame in decoder.push(&bytes) {
                    if frame.is_done() {
                        producer.finish().await;
                        return;
                    }
                    let chunk = match upstream_dialect {
                        UpstreamDialect::Chat => {
                            StreamChunk::ChatRaw(Bytes::from(frame.data.into_bytes()))
                        }
                        UpstreamDialect::Semantic => {
                            match serde_json::from_str::<StreamEvent>(&frame.data) {
                                Ok(event) => StreamChunk::Semantic(event),
                                Err(error) => {
                                    warn!(%error, "dropping unparseable upstream event");
                                    continue;
                                }
                            }
                        }
                    };
                    if !producer.send(chunk).await {
                        return;
                    }
                }
            }
            Some(Err(error)) => {
                producer
                    .fail(GatewayError::Upstream {
                        status: None,
                        message: format!("upstream stream failed: {error}"),
                    })
                    .await;
                return;
            }
            // Upstream closed without `[DONE]`; the converter synthesizes
            // the missing terminator downstream.
            None => {
                producer.finish().await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::wire::{ChatCompletionRequest, ResponsesRequest};

    fn provider_for(server: &MockServer, apis: ApiSet) -> HttpProvider {
        HttpProvider::new(HttpProviderConfig {
            name: "test".to_string(),
            base_url: server.uri(),
            base_path: "/v1".to_string(),
            api_key: Some("sk-upstream".to_string()),
            supported_apis: apis,
            ..HttpProviderConfig::default()
        })
        .unwrap()
    }

    fn chat_request(stream: bool) -> UnifiedRequest {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": stream
        }))
        .unwrap();
        UnifiedRequest::chat(req)
    }

    fn chat_response_body() -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })
    }

    #[test]
    fn base_path_is_stripped_before_joining() {
        let provider = HttpProvider::new(HttpProviderConfig {
            base_url: "https://llm.internal/v1".to_string(),
            base_path: "/v1".to_string(),
            ..HttpProviderConfig::default()
        })
        .unwrap();
        assert_eq!(
            provider.upstream_url("/v1/chat/completions"),
            "https://llm.internal/v1/chat/completions"
        );

        let bare = HttpProvider::new(HttpProviderConfig {
            base_url: "https://llm.internal".to_string(),
            base_path: String::new(),
            ..HttpProviderConfig::default()
        })
        .unwrap();
        assert_eq!(
            bare.upstream_url("/v1/chat/completions"),
            "https://llm.internal/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn batched_chat_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-upstream"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server, ApiSet::chat_only());
        let ctx = RequestContext::new(None);
        let response = provider.send_request(&ctx, &chat_request(false)).await.unwrap();

        let UnifiedResponse::Batched(BatchedPayload::Chat(chat)) = response else {
            panic!("expected batched chat response");
        };
        assert_eq!(chat.choices[0].message.content_text(), "Hello!");
    }

    #[tokio::test]
    async fn semantic_request_converts_for_chat_only_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [{"role": "user", "content": "Hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server, ApiSet::chat_only());
        let req: ResponsesRequest =
            serde_json::from_value(json!({"model": "gpt-4", "input": "Hi"})).unwrap();
        let ctx = RequestContext::new(None);
        let response = provider
            .send_request(&ctx, &UnifiedRequest::semantic(req))
            .await
            .unwrap();

        let UnifiedResponse::Batched(BatchedPayload::Semantic(semantic)) = response else {
            panic!("expected semantic response");
        };
        assert!(semantic.id.starts_with("resp_"));
        assert_eq!(semantic.output.len(), 1);
    }

    #[tokio::test]
    async fn streaming_chat_pushes_raw_chunks_then_done() {
        let sse = "data: {\"id\":\"c\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt-4\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"He\"},\"finish_reason\":null}]}\n\n\
                   data: [DONE]\n\n";
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse.as_bytes().to_vec(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server, ApiSet::chat_only());
        let ctx = RequestContext::new(None);
        let response = provider.send_request(&ctx, &chat_request(true)).await.unwrap();

        let UnifiedResponse::Streaming(mut streaming) = response else {
            panic!("expected streaming response");
        };

        let first = streaming.chunks.recv().await.unwrap();
        let StreamChunk::ChatRaw(bytes) = first else {
            panic!("expected raw chat chunk");
        };
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["choices"][0]["delta"]["content"], "He");

        let second = streaming.chunks.recv().await.unwrap();
        assert!(matches!(second, StreamChunk::Done));
    }

    #[tokio::test]
    async fn chat_request_to_semantic_only_upstream_is_rejected() {
        let server = MockServer::start().await;
        let provider = provider_for(&server, ApiSet::none().with(Api::Semantic));
        let ctx = RequestContext::new(None);
        let err = provider.send_request(&ctx, &chat_request(false)).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    }
}
