//! Semantic-dialect wire types: the `Response` object, output items, and the
//! typed SSE event vocabulary.
//!
//! The `Response` shape follows the published schema's rule that
//! absent-but-declared fields are wire-visible: optional fields serialize as
//! explicit `null` and declared defaults (`truncation: "auto"`,
//! `parallel_tool_calls: true`, ...) are emitted literally.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mints a fresh response id (`resp_` prefix).
pub fn new_response_id() -> String {
    format!("resp_{}", uuid::Uuid::new_v4().simple())
}

/// Mints a message item id derived from a response id and an output lane.
///
/// The `resp_` prefix is stripped so ids read `msg_<hex>_<index>`.
pub fn message_id(response_id: &str, index: u64) -> String {
    let stem = response_id.strip_prefix("resp_").unwrap_or(response_id);
    format!("msg_{stem}_{index}")
}

/// Lifecycle state of a semantic response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Completed,
    Failed,
    Incomplete,
}

/// Lifecycle state of one output item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Incomplete,
}

/// A content part inside a message item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputContent {
    /// Assistant-visible text. `annotations` and `logprobs` are always
    /// present arrays on the wire.
    #[serde(rename = "output_text")]
    OutputText {
        text: String,
        annotations: Vec<Value>,
        logprobs: Vec<Value>,
    },
    /// A refusal from the model.
    #[serde(rename = "refusal")]
    Refusal { refusal: String },
}

impl OutputContent {
    /// An empty `output_text` part, as emitted by `content_part.added`.
    pub fn empty_text() -> Self {
        Self::text(String::new())
    }

    /// An `output_text` part with the given body.
    pub fn text(text: impl Into<String>) -> Self {
        Self::OutputText {
            text: text.into(),
            annotations: Vec::new(),
            logprobs: Vec::new(),
        }
    }
}

/// An assistant message in a response's `output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageItem {
    pub id: String,
    pub status: ItemStatus,
    pub role: String,
    pub content: Vec<OutputContent>,
}

impl MessageItem {
    /// A fresh in-progress assistant message with no content.
    pub fn in_progress(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ItemStatus::InProgress,
            role: "assistant".to_string(),
            content: Vec::new(),
        }
    }

    /// A completed assistant message holding one text part.
    pub fn completed_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ItemStatus::Completed,
            role: "assistant".to_string(),
            content: vec![OutputContent::text(text)],
        }
    }

    /// Concatenated text of every `output_text` part.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                OutputContent::OutputText { text, .. } => Some(text.as_str()),
                OutputContent::Refusal { .. } => None,
            })
            .collect()
    }
}

/// A function invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub call_id: String,
    pub name: String,
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
}

/// The caller-supplied result of a function invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOutputItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub call_id: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
}

/// Model reasoning surfaced as an output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub summary: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
}

/// One entry in a response's ordered `output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputItem {
    #[serde(rename = "message")]
    Message(MessageItem),
    #[serde(rename = "function_call")]
    FunctionCall(FunctionCallItem),
    #[serde(rename = "function_call_output")]
    FunctionCallOutput(FunctionCallOutputItem),
    #[serde(rename = "reasoning")]
    Reasoning(ReasoningItem),
}

/// Input-token detail breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

/// Output-token detail breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u64,
}

/// Token accounting on a semantic response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub input_tokens_details: InputTokensDetails,
    #[serde(default)]
    pub output_tokens_details: OutputTokensDetails,
}

impl ResponseUsage {
    /// Builds usage from input/output counts, deriving the total.
    pub fn from_counts(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            input_tokens_details: InputTokensDetails::default(),
            output_tokens_details: OutputTokensDetails::default(),
        }
    }
}

/// Error attached to a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

/// Why a response ended `incomplete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncompleteDetails {
    pub reason: String,
}

/// `text` configuration block; only the plain-text format is produced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextConfig {
    pub format: TextFormat,
}

/// Inner `text.format` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            format: TextFormat {
                kind: "text".to_string(),
            },
        }
    }
}

/// A tool in the semantic dialect's flattened shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTool {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The semantic `Response` object.
///
/// Optional fields deliberately have no `skip_serializing_if`: the wire shape
/// requires explicit `null`s for declared-but-absent fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub object: String,
    pub created_at: i64,
    #[serde(default)]
    pub completed_at: Option<i64>,
    pub status: ResponseStatus,
    pub model: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
    #[serde(default)]
    pub error: Option<ResponseError>,
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub max_output_tokens: Option<u64>,
    #[serde(default)]
    pub previous_response_id: Option<String>,
    #[serde(default)]
    pub reasoning: Option<Value>,
    #[serde(default)]
    pub user: Option<String>,
    pub temperature: f64,
    pub top_p: f64,
    pub truncation: String,
    pub parallel_tool_calls: bool,
    pub store: bool,
    pub background: bool,
    pub service_tier: String,
    pub text: TextConfig,
    #[serde(default)]
    pub tools: Vec<ResponseTool>,
    pub tool_choice: Value,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl Response {
    /// A fresh in-progress response with every declared default populated.
    pub fn new(id: impl Into<String>, model: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            object: "response".to_string(),
            created_at,
            completed_at: None,
            status: ResponseStatus::InProgress,
            model: model.into(),
            output: Vec::new(),
            usage: None,
            error: None,
            incomplete_details: None,
            instructions: None,
            max_output_tokens: None,
            previous_response_id: None,
            reasoning: None,
            user: None,
            temperature: 1.0,
            top_p: 1.0,
            truncation: "auto".to_string(),
            parallel_tool_calls: true,
            store: true,
            background: false,
            service_tier: "auto".to_string(),
            text: TextConfig::default(),
            tools: Vec::new(),
            tool_choice: Value::String("auto".to_string()),
            metadata: serde_json::Map::new(),
        }
    }

    /// Sum of usage, or zeros when the upstream reported none.
    pub fn usage_or_zero(&self) -> ResponseUsage {
        self.usage.unwrap_or_default()
    }
}

/// `POST /v1/responses` request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ResponseInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ResponseTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    /// `auto` (default) or `disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, Value>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ResponsesRequest {
    /// Whether the client asked for a streamed response.
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Output-token cap; `max_output_tokens` wins when both aliases are set.
    pub fn output_token_cap(&self) -> Option<u32> {
        self.max_output_tokens.or(self.max_tokens)
    }
}

/// The `input` field: a bare string or an ordered item sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseInput {
    Text(String),
    Items(Vec<InputItem>),
}

/// One element of an `input` item sequence.
///
/// Message items (with or without an explicit `"type": "message"`) are
/// parsed structurally; everything else (`function_call`, `reasoning`, ...)
/// is held opaque and flows through unchanged to dialect-native providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputItem {
    Message(InputMessage),
    Other(Value),
}

/// A message item inside `input`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub role: String,
    pub content: InputContent,
}

impl InputMessage {
    /// Whether this item is a message per its `type` tag (absent counts).
    pub fn is_message(&self) -> bool {
        match self.kind.as_deref() {
            None | Some("message") => true,
            Some(_) => false,
        }
    }
}

/// Message content inside an input item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputContent {
    Text(String),
    Parts(Vec<InputContentPart>),
}

impl InputContent {
    /// Concatenated text of the string form or of every `input_text` part.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    InputContentPart::Text(p) => Some(p.text.as_str()),
                    InputContentPart::Other(_) => None,
                })
                .collect(),
        }
    }
}

/// One part of multi-part input content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputContentPart {
    Text(InputTextPart),
    Other(Value),
}

/// An `input_text` content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTextPart {
    #[serde(rename = "type")]
    pub kind: InputTextTag,
    pub text: String,
}

/// Tag pinning a part to `"input_text"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputTextTag {
    #[serde(rename = "input_text")]
    InputText,
}

/// A typed semantic SSE event. The serialized `type` field doubles as the
/// SSE `event:` name; every variant carries a `sequence_number` scoped to
/// its parent response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "response.created")]
    ResponseCreated {
        sequence_number: u64,
        response: Response,
    },
    #[serde(rename = "response.in_progress")]
    ResponseInProgress {
        sequence_number: u64,
        response: Response,
    },
    #[serde(rename = "response.completed")]
    ResponseCompleted {
        sequence_number: u64,
        response: Response,
    },
    #[serde(rename = "response.failed")]
    ResponseFailed {
        sequence_number: u64,
        response: Response,
    },
    #[serde(rename = "response.incomplete")]
    ResponseIncomplete {
        sequence_number: u64,
        response: Response,
    },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        sequence_number: u64,
        output_index: u64,
        item: OutputItem,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        sequence_number: u64,
        output_index: u64,
        item: OutputItem,
    },
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        content_index: u64,
        part: OutputContent,
    },
    #[serde(rename = "response.content_part.done")]
    ContentPartDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        content_index: u64,
        part: OutputContent,
    },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        content_index: u64,
        delta: String,
    },
    #[serde(rename = "response.output_text.done")]
    OutputTextDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        content_index: u64,
        text: String,
    },
    #[serde(rename = "response.refusal.delta")]
    RefusalDelta {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        content_index: u64,
        delta: String,
    },
    #[serde(rename = "response.refusal.done")]
    RefusalDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        content_index: u64,
        refusal: String,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        arguments: String,
    },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        summary_index: u64,
        delta: String,
    },
    #[serde(rename = "response.reasoning_summary_text.done")]
    ReasoningSummaryTextDone {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
        summary_index: u64,
        text: String,
    },
    #[serde(rename = "response.file_search_call.in_progress")]
    FileSearchCallInProgress {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
    },
    #[serde(rename = "response.file_search_call.searching")]
    FileSearchCallSearching {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
    },
    #[serde(rename = "response.file_search_call.completed")]
    FileSearchCallCompleted {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
    },
    #[serde(rename = "response.web_search_call.in_progress")]
    WebSearchCallInProgress {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
    },
    #[serde(rename = "response.web_search_call.searching")]
    WebSearchCallSearching {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
    },
    #[serde(rename = "response.web_search_call.completed")]
    WebSearchCallCompleted {
        sequence_number: u64,
        item_id: String,
        output_index: u64,
    },
    #[serde(rename = "error")]
    Error {
        sequence_number: u64,
        #[serde(default)]
        code: Option<String>,
        message: String,
        #[serde(default)]
        param: Option<String>,
    },
}

impl StreamEvent {
    /// The wire `type` string, also used as the SSE `event:` name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ResponseCreated { .. } => "response.created",
            Self::ResponseInProgress { .. } => "response.in_progress",
            Self::ResponseCompleted { .. } => "response.completed",
            Self::ResponseFailed { .. } => "response.failed",
            Self::ResponseIncomplete { .. } => "response.incomplete",
            Self::OutputItemAdded { .. } => "response.output_item.added",
            Self::OutputItemDone { .. } => "response.output_item.done",
            Self::ContentPartAdded { .. } => "response.content_part.added",
            Self::ContentPartDone { .. } => "response.content_part.done",
            Self::OutputTextDelta { .. } => "response.output_text.delta",
            Self::OutputTextDone { .. } => "response.output_text.done",
            Self::RefusalDelta { .. } => "response.refusal.delta",
            Self::RefusalDone { .. } => "response.refusal.done",
            Self::FunctionCallArgumentsDelta { .. } => "response.function_call_arguments.delta",
            Self::FunctionCallArgumentsDone { .. } => "response.function_call_arguments.done",
            Self::ReasoningSummaryTextDelta { .. } => "response.reasoning_summary_text.delta",
            Self::ReasoningSummaryTextDone { .. } => "response.reasoning_summary_text.done",
            Self::FileSearchCallInProgress { .. } => "response.file_search_call.in_progress",
            Self::FileSearchCallSearching { .. } => "response.file_search_call.searching",
            Self::FileSearchCallCompleted { .. } => "response.file_search_call.completed",
            Self::WebSearchCallInProgress { .. } => "response.web_search_call.in_progress",
            Self::WebSearchCallSearching { .. } => "response.web_search_call.searching",
            Self::WebSearchCallCompleted { .. } => "response.web_search_call.completed",
            Self::Error { .. } => "error",
        }
    }

    /// The event's sequence number.
    pub fn sequence_number(&self) -> u64 {
        match self {
            Self::ResponseCreated { sequence_number, .. }
            | Self::ResponseInProgress { sequence_number, .. }
            | Self::ResponseCompleted { sequence_number, .. }
            | Self::ResponseFailed { sequence_number, .. }
            | Self::ResponseIncomplete { sequence_number, .. }
            | Self::OutputItemAdded { sequence_number, .. }
            | Self::OutputItemDone { sequence_number, .. }
            | Self::ContentPartAdded { sequence_number, .. }
            | Self::ContentPartDone { sequence_number, .. }
            | Self::OutputTextDelta { sequence_number, .. }
            | Self::OutputTextDone { sequence_number, .. }
            | Self::RefusalDelta { sequence_number, .. }
            | Self::RefusalDone { sequence_number, .. }
            | Self::FunctionCallArgumentsDelta { sequence_number, .. }
            | Self::FunctionCallArgumentsDone { sequence_number, .. }
            | Self::ReasoningSummaryTextDelta { sequence_number, .. }
            | Self::ReasoningSummaryTextDone { sequence_number, .. }
            | Self::FileSearchCallInProgress { sequence_number, .. }
            | Self::FileSearchCallSearching { sequence_number, .. }
            | Self::FileSearchCallCompleted { sequence_number, .. }
            | Self::WebSearchCallInProgress { sequence_number, .. }
            | Self::WebSearchCallSearching { sequence_number, .. }
            | Self::WebSearchCallCompleted { sequence_number, .. }
            | Self::Error { sequence_number, .. } => *sequence_number,
        }
    }

    /// Overwrites the event's sequence number (used by the writer when the
    /// producer left it zero).
    pub fn set_sequence_number(&mut self, value: u64) {
        match self {
            Self::ResponseCreated { sequence_number, .. }
            | Self::ResponseInProgress { sequence_number, .. }
            | Self::ResponseCompleted { sequence_number, .. }
            | Self::ResponseFailed { sequence_number, .. }
            | Self::ResponseIncomplete { sequence_number, .. }
            | Self::OutputItemAdded { sequence_number, .. }
            | Self::OutputItemDone { sequence_number, .. }
            | Self::ContentPartAdded { sequence_number, .. }
            | Self::ContentPartDone { sequence_number, .. }
            | Self::OutputTextDelta { sequence_number, .. }
            | Self::OutputTextDone { sequence_number, .. }
            | Self::RefusalDelta { sequence_number, .. }
            | Self::RefusalDone { sequence_number, .. }
            | Self::FunctionCallArgumentsDelta { sequence_number, .. }
            | Self::FunctionCallArgumentsDone { sequence_number, .. }
            | Self::ReasoningSummaryTextDelta { sequence_number, .. }
            | Self::ReasoningSummaryTextDone { sequence_number, .. }
            | Self::FileSearchCallInProgress { sequence_number, .. }
            | Self::FileSearchCallSearching { sequence_number, .. }
            | Self::FileSearchCallCompleted { sequence_number, .. }
            | Self::WebSearchCallInProgress { sequence_number, .. }
            | Self::WebSearchCallSearching { sequence_number, .. }
            | Self::WebSearchCallCompleted { sequence_number, .. }
            | Self::Error { sequence_number, .. } => *sequence_number = value,
        }
    }
}
