//! Dialect-agnostic request/response shapes passed between the HTTP layer
//! and the provider layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::wire::chat::{
    ChatCompletionRequest, ChatCompletionResponse, EmbeddingsRequest, EmbeddingsResponse,
    ImageGenerationRequest, ImagesResponse, ModelList, StopSequence, Tool,
};
use crate::wire::semantic::{Response, ResponsesRequest, StreamEvent};

/// Minimum chunk-channel capacity for streamed responses.
pub const STREAM_CHANNEL_CAPACITY: usize = 16;

/// Which wire dialect a request or response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Chat,
    Semantic,
    Embeddings,
    Images,
    Models,
}

impl Dialect {
    /// Lowercase name, used for metrics labels and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Semantic => "semantic",
            Self::Embeddings => "embeddings",
            Self::Images => "images",
            Self::Models => "models",
        }
    }

    /// The provider API this dialect dispatches to, if any; model listing is
    /// served from the registry and never reaches a provider.
    pub fn api(&self) -> Option<Api> {
        match self {
            Self::Chat => Some(Api::Chat),
            Self::Semantic => Some(Api::Semantic),
            Self::Embeddings => Some(Api::Embeddings),
            Self::Images => Some(Api::Images),
            Self::Models => None,
        }
    }
}

/// A provider-facing API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Api {
    Chat,
    Semantic,
    Embeddings,
    Images,
}

/// The set of APIs a provider declares support for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiSet {
    bits: u8,
}

impl ApiSet {
    const CHAT: u8 = 1 << 0;
    const SEMANTIC: u8 = 1 << 1;
    const EMBEDDINGS: u8 = 1 << 2;
    const IMAGES: u8 = 1 << 3;

    /// The empty set.
    pub fn none() -> Self {
        Self { bits: 0 }
    }

    /// Every API.
    pub fn all() -> Self {
        Self {
            bits: Self::CHAT | Self::SEMANTIC | Self::EMBEDDINGS | Self::IMAGES,
        }
    }

    /// Chat only; the most common upstream shape.
    pub fn chat_only() -> Self {
        Self::none().with(Api::Chat)
    }

    /// Adds an API to the set.
    pub fn with(mut self, api: Api) -> Self {
        self.bits |= Self::bit(api);
        self
    }

    /// Whether the set contains `api`.
    pub fn contains(&self, api: Api) -> bool {
        self.bits & Self::bit(api) != 0
    }

    /// Set intersection, used by the load balancer to advertise what every
    /// child can serve.
    pub fn intersect(&self, other: ApiSet) -> ApiSet {
        Self {
            bits: self.bits & other.bits,
        }
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    fn bit(api: Api) -> u8 {
        match api {
            Api::Chat => Self::CHAT,
            Api::Semantic => Self::SEMANTIC,
            Api::Embeddings => Self::EMBEDDINGS,
            Api::Images => Self::IMAGES,
        }
    }
}

impl FromIterator<Api> for ApiSet {
    fn from_iter<T: IntoIterator<Item = Api>>(iter: T) -> Self {
        iter.into_iter().fold(Self::none(), Self::with)
    }
}

/// Sampling parameters common to the language dialects.
#[derive(Debug, Clone, Default)]
pub struct SamplingParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stop: Option<StopSequence>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

/// Per-dialect request payload.
#[derive(Debug, Clone)]
pub enum RequestPayload {
    Chat(ChatCompletionRequest),
    Semantic(ResponsesRequest),
    Embeddings(EmbeddingsRequest),
    Images(ImageGenerationRequest),
    Models,
}

/// The internal, dialect-tagged request shape.
#[derive(Debug, Clone)]
pub struct UnifiedRequest {
    pub dialect: Dialect,
    pub streaming: bool,
    pub model: String,
    /// Canonical inbound path, e.g. `/v1/chat/completions`.
    pub endpoint: String,
    pub params: SamplingParams,
    /// Tools in the chat shape, when the dialect carries any.
    pub tools: Option<Vec<Tool>>,
    pub tool_choice: Option<serde_json::Value>,
    pub payload: RequestPayload,
    /// The exact inbound body, for providers that forward verbatim.
    pub raw_body: Option<Bytes>,
    /// Free-form headers to forward upstream.
    pub headers: HashMap<String, String>,
}

impl UnifiedRequest {
    /// Wraps a chat request, lifting the shared sampling parameters.
    pub fn chat(request: ChatCompletionRequest) -> Self {
        let params = SamplingParams {
            temperature: request.temperature,
            top_p: request.top_p,
            // `max_completion_tokens` is the newer alias and wins.
            max_tokens: request.max_completion_tokens.or(request.max_tokens),
            stop: request.stop.clone(),
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
        };
        Self {
            dialect: Dialect::Chat,
            streaming: request.wants_stream(),
            model: request.model.clone(),
            endpoint: "/v1/chat/completions".to_string(),
            params,
            tools: request.tools.clone(),
            tool_choice: request.tool_choice.clone(),
            payload: RequestPayload::Chat(request),
            raw_body: None,
            headers: HashMap::new(),
        }
    }

    /// Wraps a semantic request.
    pub fn semantic(request: ResponsesRequest) -> Self {
        let params = SamplingParams {
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.output_token_cap(),
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
        };
        Self {
            dialect: Dialect::Semantic,
            streaming: request.wants_stream(),
            model: request.model.clone(),
            endpoint: "/v1/responses".to_string(),
            params,
            tools: None,
            tool_choice: request.tool_choice.clone(),
            payload: RequestPayload::Semantic(request),
            raw_body: None,
            headers: HashMap::new(),
        }
    }

    /// Wraps an embeddings request.
    pub fn embeddings(request: EmbeddingsRequest) -> Self {
        Self {
            dialect: Dialect::Embeddings,
            streaming: false,
            model: request.model.clone(),
            endpoint: "/v1/embeddings".to_string(),
            params: SamplingParams::default(),
            tools: None,
            tool_choice: None,
            payload: RequestPayload::Embeddings(request),
            raw_body: None,
            headers: HashMap::new(),
        }
    }

    /// Wraps an image-generation request.
    pub fn images(request: ImageGenerationRequest) -> Self {
        let model = request.model.clone().unwrap_or_default();
        Self {
            dialect: Dialect::Images,
            streaming: false,
            model,
            endpoint: "/v1/images/generations".to_string(),
            params: SamplingParams::default(),
            tools: None,
            tool_choice: None,
            payload: RequestPayload::Images(request),
            raw_body: None,
            headers: HashMap::new(),
        }
    }

    /// Attaches the raw inbound body for passthrough-capable providers.
    pub fn with_raw_body(mut self, body: Bytes) -> Self {
        self.raw_body = Some(body);
        self
    }
}

/// A batched (non-streaming) response payload.
#[derive(Debug, Clone)]
pub enum BatchedPayload {
    Chat(ChatCompletionResponse),
    Semantic(Response),
    Embeddings(EmbeddingsResponse),
    Images(ImagesResponse),
    Models(ModelList),
}

impl BatchedPayload {
    /// `(input, output, total)` token counts, when the payload reports usage.
    pub fn usage_tokens(&self) -> Option<(u64, u64, u64)> {
        match self {
            Self::Chat(resp) => resp
                .usage
                .map(|u| (u.prompt_tokens, u.completion_tokens, u.total_tokens)),
            Self::Semantic(resp) => resp
                .usage
                .map(|u| (u.input_tokens, u.output_tokens, u.total_tokens)),
            Self::Embeddings(resp) => resp.usage.map(|u| (u.prompt_tokens, 0, u.total_tokens)),
            Self::Images(_) | Self::Models(_) => None,
        }
    }
}

/// One frame of a streamed response.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// A raw chat-dialect SSE data payload, forwarded verbatim.
    ChatRaw(Bytes),
    /// A typed semantic event.
    Semantic(StreamEvent),
    /// Terminal sentinel; exactly one ends every stream, and nothing
    /// follows it. A pending error (delivered on the error channel before
    /// `Done`) turns the termination into a failure.
    Done,
}

/// A streamed response: a bounded chunk channel, a parallel error channel
/// carrying at most one error, and an idempotent close handle that releases
/// the upstream connection.
#[derive(Debug)]
pub struct StreamingResponse {
    pub chunks: mpsc::Receiver<StreamChunk>,
    pub errors: mpsc::Receiver<GatewayError>,
    close: CloseHandle,
}

impl StreamingResponse {
    /// Creates a channel pair for a new stream.
    pub fn channel(close: CloseHandle) -> (StreamProducer, StreamingResponse) {
        let (chunk_tx, chunk_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(1);
        (
            StreamProducer {
                chunks: chunk_tx,
                errors: error_tx,
            },
            StreamingResponse {
                chunks: chunk_rx,
                errors: error_rx,
                close,
            },
        )
    }

    /// The stream's close handle.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Releases the upstream connection. Safe to call more than once.
    pub fn close(&self) {
        self.close.close();
    }
}

/// Producer half of a streamed response.
#[derive(Debug, Clone)]
pub struct StreamProducer {
    chunks: mpsc::Sender<StreamChunk>,
    errors: mpsc::Sender<GatewayError>,
}

impl StreamProducer {
    /// Sends one chunk; returns `false` when the consumer is gone.
    pub async fn send(&self, chunk: StreamChunk) -> bool {
        self.chunks.send(chunk).await.is_ok()
    }

    /// Delivers the stream's single error. Later errors are dropped.
    pub async fn fail(&self, error: GatewayError) {
        let _ = self.errors.try_send(error);
        let _ = self.chunks.send(StreamChunk::Done).await;
    }

    /// Terminates the stream successfully.
    pub async fn finish(&self) {
        let _ = self.chunks.send(StreamChunk::Done).await;
    }
}

/// Idempotent release of a stream's upstream resources.
///
/// Cancels the producer's token exactly once and runs an optional callback;
/// every exit path (completion, error, client disconnect) may call it.
#[derive(Clone)]
pub struct CloseHandle {
    inner: Arc<CloseInner>,
}

struct CloseInner {
    closed: AtomicBool,
    token: CancellationToken,
    callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl CloseHandle {
    /// A handle that cancels `token` on close.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(CloseInner {
                closed: AtomicBool::new(false),
                token,
                callback: Mutex::new(None),
            }),
        }
    }

    /// A handle that additionally runs `callback` on first close.
    pub fn with_callback(token: CancellationToken, callback: impl FnOnce() + Send + 'static) -> Self {
        let handle = Self::new(token);
        *handle.inner.callback.lock() = Some(Box::new(callback));
        handle
    }

    /// A handle with nothing to release.
    pub fn noop() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Releases the stream's resources; only the first call acts.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.token.cancel();
        if let Some(callback) = self.inner.callback.lock().take() {
            callback();
        }
    }

    /// Whether the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A gateway response: batched payload or live stream.
#[derive(Debug)]
pub enum UnifiedResponse {
    Batched(BatchedPayload),
    Streaming(StreamingResponse),
}
