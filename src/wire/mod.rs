//! In-memory wire model: dialect tags, request/response types for both
//! dialects, and the unified shapes threaded through the pipeline.

pub mod chat;
pub mod semantic;
pub mod unified;

pub use chat::{
    ChatChoice, ChatChunkChoice, ChatCompletionChunk, ChatCompletionRequest,
    ChatCompletionResponse, ChatDelta, ChatMessage, ChatUsage, Embedding, EmbeddingsRequest,
    EmbeddingsResponse, EmbeddingsUsage, FunctionDef, ImageData, ImageGenerationRequest,
    ImagesResponse, MessageContent, Model, ModelList, StopSequence, StreamOptions, Tool,
};
pub use semantic::{
    FunctionCallItem, FunctionCallOutputItem, IncompleteDetails, InputContent,
    InputContentPart, InputItem, InputMessage, InputTextPart, InputTextTag, ItemStatus,
    MessageItem, OutputContent, OutputItem, ReasoningItem, Response, ResponseError, ResponseInput,
    ResponseStatus, ResponseTool, ResponseUsage, ResponsesRequest, StreamEvent, TextConfig,
    TextFormat, message_id, new_response_id,
};
pub use unified::{
    Api, ApiSet, BatchedPayload, CloseHandle, Dialect, RequestPayload, STREAM_CHANNEL_CAPACITY,
    SamplingParams, StreamChunk, StreamProducer, StreamingResponse, UnifiedRequest,
    UnifiedResponse,
};
