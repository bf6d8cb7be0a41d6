//! Dialect conversion: lossless mapping between the chat dialect and the
//! semantic-event dialect, batched and streaming.
//!
//! Batched conversions are pure functions; the streaming path is a stateful
//! per-response iterator in [`stream`].

pub mod stream;

#[cfg(test)]
mod tests;

pub use stream::StreamConverter;

use crate::error::GatewayError;
use crate::wire::chat::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatUsage, FunctionDef,
    Tool,
};
use crate::wire::semantic::{
    IncompleteDetails, InputItem, MessageItem, OutputItem, Response, ResponseInput, ResponseStatus,
    ResponseUsage, ResponsesRequest, new_response_id,
};
use crate::wire::semantic::message_id;

/// Maps a semantic request onto the chat dialect.
///
/// String input becomes a single user message; item-sequence input is walked
/// and every message item contributes its text, while non-message items
/// (`function_call`, `reasoning`, ...) are dropped — they only carry meaning
/// for dialect-native upstreams. `instructions` becomes a leading system
/// message.
pub fn semantic_to_chat_request(
    request: &ResponsesRequest,
) -> Result<ChatCompletionRequest, GatewayError> {
    let input = request.input.as_ref().ok_or_else(|| {
        GatewayError::invalid_param("Missing required parameter: 'input'.", "input")
    })?;

    let mut messages = Vec::new();
    if let Some(instructions) = &request.instructions {
        messages.push(ChatMessage::text("system", instructions));
    }

    let mut extracted = 0usize;
    match input {
        ResponseInput::Text(text) => {
            messages.push(ChatMessage::text("user", text));
            extracted += 1;
        }
        ResponseInput::Items(items) => {
            for item in items {
                let InputItem::Message(message) = item else {
                    continue;
                };
                if !message.is_message() || message.role.is_empty() {
                    continue;
                }
                messages.push(ChatMessage::text(&message.role, message.content.as_text()));
                extracted += 1;
            }
        }
    }

    if extracted == 0 {
        return Err(GatewayError::invalid_code(
            "Input contained no valid messages.",
            "no_valid_messages",
        ));
    }

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .filter(|tool| tool.kind == "function")
            .filter_map(|tool| {
                Some(Tool {
                    kind: "function".to_string(),
                    function: FunctionDef {
                        name: tool.name.clone()?,
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                        strict: tool.strict,
                    },
                })
            })
            .collect::<Vec<_>>()
    });
    let tools = tools.filter(|t| !t.is_empty());

    Ok(ChatCompletionRequest {
        model: request.model.clone(),
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        stream: request.stream,
        max_tokens: request.output_token_cap(),
        tools,
        tool_choice: request.tool_choice.clone(),
        user: request.user.clone(),
        ..Default::default()
    })
}

/// Maps a batched chat response onto the semantic `Response` shape.
///
/// Every assistant choice becomes a completed message item; a `length`
/// finish reason marks the response (not the item) `incomplete`. `origin`,
/// when given, is the semantic request whose echoes (tools, sampling knobs)
/// the response must carry.
pub fn chat_to_semantic_response(
    chat: &ChatCompletionResponse,
    origin: Option<&ResponsesRequest>,
) -> Response {
    let response_id = new_response_id();
    let mut response = Response::new(response_id.clone(), chat.model.clone(), chat.created);
    // A batched upstream reports a single creation instant.
    response.completed_at = Some(chat.created);

    let mut truncated = false;
    let mut output = Vec::new();
    for choice in &chat.choices {
        if choice.message.role != "assistant" {
            continue;
        }
        if choice.finish_reason.as_deref() == Some("length") {
            truncated = true;
        }
        let item = MessageItem::completed_text(
            message_id(&response_id, u64::from(choice.index)),
            choice.message.content_text(),
        );
        output.push(OutputItem::Message(item));
    }
    response.output = output;

    response.status = if truncated {
        response.incomplete_details = Some(IncompleteDetails {
            reason: "max_output_tokens".to_string(),
        });
        ResponseStatus::Incomplete
    } else {
        ResponseStatus::Completed
    };

    response.usage = Some(usage_to_semantic(chat.usage.unwrap_or_default()));

    if let Some(origin) = origin {
        response.tools = origin.tools.clone().unwrap_or_default();
        if let Some(tool_choice) = &origin.tool_choice {
            response.tool_choice = tool_choice.clone();
        }
        if let Some(temperature) = origin.temperature {
            response.temperature = temperature;
        }
        if let Some(top_p) = origin.top_p {
            response.top_p = top_p;
        }
        if let Some(truncation) = &origin.truncation {
            response.truncation = truncation.clone();
        }
        if let Some(parallel) = origin.parallel_tool_calls {
            response.parallel_tool_calls = parallel;
        }
        if let Some(store) = origin.store {
            response.store = store;
        }
        if let Some(metadata) = &origin.metadata {
            response.metadata = metadata.clone();
        }
        response.instructions = origin.instructions.clone();
        response.previous_response_id = origin.previous_response_id.clone();
        response.max_output_tokens = origin.output_token_cap().map(u64::from);
        response.user = origin.user.clone();
    }

    response
}

/// Flattens a semantic `Response` back into a batched chat response.
///
/// Message items become choices whose content concatenates every
/// `output_text` part; non-message items are skipped. An `incomplete`
/// response maps to `finish_reason: "length"`, everything else to `"stop"`.
pub fn semantic_to_chat_response(response: &Response) -> ChatCompletionResponse {
    let finish_reason = if response.status == ResponseStatus::Incomplete {
        "length"
    } else {
        "stop"
    };

    let mut choices = Vec::new();
    for item in &response.output {
        let OutputItem::Message(message) = item else {
            continue;
        };
        choices.push(ChatChoice {
            index: choices.len() as u32,
            message: ChatMessage::text("assistant", message.text()),
            finish_reason: Some(finish_reason.to_string()),
            logprobs: None,
        });
    }

    ChatCompletionResponse {
        id: response.id.clone(),
        object: "chat.completion".to_string(),
        created: response.created_at,
        model: response.model.clone(),
        choices,
        usage: response.usage.map(usage_to_chat),
        extra: serde_json::Map::new(),
    }
}

pub(crate) fn usage_to_semantic(usage: ChatUsage) -> ResponseUsage {
    ResponseUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        ..Default::default()
    }
}

pub(crate) fn usage_to_chat(usage: ResponseUsage) -> ChatUsage {
    ChatUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.total_tokens,
    }
}
