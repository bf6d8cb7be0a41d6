use serde_json::json;

use super::*;
use crate::wire::chat::{ChatCompletionChunk, ChatCompletionResponse};
use crate::wire::semantic::{ItemStatus, ResponsesRequest, StreamEvent};

fn chat_chunk(value: serde_json::Value) -> ChatCompletionChunk {
    serde_json::from_value(value).unwrap()
}

fn delta_chunk(content: &str) -> ChatCompletionChunk {
    chat_chunk(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "gpt-4",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    }))
}

fn finish_chunk(reason: &str) -> ChatCompletionChunk {
    chat_chunk(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "gpt-4",
        "choices": [{"index": 0, "delta": {}, "finish_reason": reason}]
    }))
}

fn sample_chat_response() -> ChatCompletionResponse {
    serde_json::from_value(json!({
        "id": "chatcmpl-abc",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello!"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
    }))
    .unwrap()
}

mod request_mapping {
    use super::*;

    #[test]
    fn string_input_becomes_user_message() {
        let request: ResponsesRequest =
            serde_json::from_value(json!({"model": "gpt-4", "input": "Hi"})).unwrap();
        let chat = semantic_to_chat_request(&request).unwrap();
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].role, "user");
        assert_eq!(chat.messages[0].content_text(), "Hi");
    }

    #[test]
    fn item_input_extracts_messages_and_drops_the_rest() {
        let request: ResponsesRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "input": [
                {"type": "message", "role": "user", "content": "Hi"},
                {"type": "function_call", "call_id": "c", "name": "f", "arguments": "{}"},
                {"role": "assistant", "content": [
                    {"type": "input_text", "text": "Hel"},
                    {"type": "input_text", "text": "lo"}
                ]}
            ]
        }))
        .unwrap();

        let chat = semantic_to_chat_request(&request).unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[1].content_text(), "Hello");
    }

    #[test]
    fn missing_input_names_the_parameter() {
        let request: ResponsesRequest =
            serde_json::from_value(json!({"model": "gpt-4"})).unwrap();
        let err = semantic_to_chat_request(&request).unwrap_err();
        assert_eq!(err.error_param(), Some("input"));
    }

    #[test]
    fn no_surviving_messages_is_rejected() {
        let request: ResponsesRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "input": [{"type": "function_call", "call_id": "c", "name": "f", "arguments": "{}"}]
        }))
        .unwrap();
        let err = semantic_to_chat_request(&request).unwrap_err();
        assert_eq!(err.error_code(), Some("no_valid_messages"));
    }

    #[test]
    fn instructions_do_not_satisfy_message_extraction() {
        let request: ResponsesRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "instructions": "Be brief.",
            "input": []
        }))
        .unwrap();
        assert!(semantic_to_chat_request(&request).is_err());
    }

    #[test]
    fn max_output_tokens_wins_over_alias() {
        let request: ResponsesRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "input": "Hi",
            "max_tokens": 100,
            "max_output_tokens": 42
        }))
        .unwrap();
        let chat = semantic_to_chat_request(&request).unwrap();
        assert_eq!(chat.max_tokens, Some(42));
    }

    #[test]
    fn only_function_tools_are_forwarded() {
        let request: ResponsesRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "input": "Hi",
            "tools": [
                {"type": "function", "name": "lookup", "parameters": {"type": "object"}},
                {"type": "web_search"}
            ]
        }))
        .unwrap();
        let chat = semantic_to_chat_request(&request).unwrap();
        let tools = chat.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "lookup");
    }
}

mod response_mapping {
    use super::*;

    #[test]
    fn chat_response_becomes_completed_semantic_response() {
        let chat = sample_chat_response();
        let response = chat_to_semantic_response(&chat, None);

        assert!(response.id.starts_with("resp_"));
        assert_eq!(response.status, ResponseStatus::Completed);
        assert_eq!(response.created_at, chat.created);
        assert_eq!(response.completed_at, Some(chat.created));
        assert_eq!(response.output.len(), 1);

        let OutputItem::Message(item) = &response.output[0] else {
            panic!("expected message item");
        };
        assert!(item.id.starts_with("msg_"));
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.text(), "Hello!");

        let usage = response.usage.unwrap();
        assert_eq!(usage.input_tokens, 1);
        assert_eq!(usage.output_tokens, 1);
        assert_eq!(usage.total_tokens, 2);
    }

    #[test]
    fn length_finish_marks_response_incomplete() {
        let mut chat = sample_chat_response();
        chat.choices[0].finish_reason = Some("length".to_string());
        let response = chat_to_semantic_response(&chat, None);

        assert_eq!(response.status, ResponseStatus::Incomplete);
        assert_eq!(
            response.incomplete_details.as_ref().map(|d| d.reason.as_str()),
            Some("max_output_tokens")
        );
        // The item itself stays completed.
        let OutputItem::Message(item) = &response.output[0] else {
            panic!("expected message item");
        };
        assert_eq!(item.status, ItemStatus::Completed);
    }

    #[test]
    fn round_trip_preserves_content_usage_and_finish_reason() {
        let chat = sample_chat_response();
        let response = chat_to_semantic_response(&chat, None);
        let back = semantic_to_chat_response(&response);

        assert_eq!(back.choices.len(), chat.choices.len());
        assert_eq!(
            back.choices[0].message.content_text(),
            chat.choices[0].message.content_text()
        );
        assert_eq!(back.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(back.usage, chat.usage);

        let mut truncated = chat.clone();
        truncated.choices[0].finish_reason = Some("length".to_string());
        let semantic = chat_to_semantic_response(&truncated, None);
        let back = semantic_to_chat_response(&semantic);
        assert_eq!(back.choices[0].finish_reason.as_deref(), Some("length"));
    }

    #[test]
    fn origin_request_knobs_are_echoed() {
        let origin: ResponsesRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "input": "Hi",
            "temperature": 0.3,
            "truncation": "disabled",
            "metadata": {"team": "search"}
        }))
        .unwrap();
        let response = chat_to_semantic_response(&sample_chat_response(), Some(&origin));

        assert_eq!(response.temperature, 0.3);
        assert_eq!(response.truncation, "disabled");
        assert_eq!(response.metadata.get("team"), Some(&json!("search")));
        assert_eq!(response.tool_choice, json!("auto"));
    }
}

mod streaming {
    use super::*;

    fn event_types(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_type).collect()
    }

    #[test]
    fn complete_stream_emits_the_full_sequence() {
        let mut converter = StreamConverter::new("gpt-4");
        let mut events = converter.begin();
        events.extend(converter.on_chunk(&delta_chunk("He")));
        events.extend(converter.on_chunk(&delta_chunk("llo")));
        events.extend(converter.on_chunk(&finish_chunk("stop")));
        events.extend(converter.finish());

        assert_eq!(
            event_types(&events),
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

        // Sequence numbers strictly increase by 1 from 1.
        for (offset, event) in events.iter().enumerate() {
            assert_eq!(event.sequence_number(), offset as u64 + 1);
        }

        let done_text = events.iter().find_map(|event| match event {
            StreamEvent::OutputTextDone { text, .. } => Some(text.clone()),
            _ => None,
        });
        assert_eq!(done_text.as_deref(), Some("Hello"));

        let StreamEvent::ResponseCompleted { response, .. } = events.last().unwrap() else {
            panic!("expected response.completed last");
        };
        assert_eq!(response.status, ResponseStatus::Completed);
        assert!(response.completed_at.is_some());
        assert_eq!(response.output.len(), 1);
    }

    #[test]
    fn deltas_after_finish_are_discarded() {
        let mut converter = StreamConverter::new("gpt-4");
        converter.begin();
        converter.on_chunk(&delta_chunk("Hi"));
        converter.on_chunk(&finish_chunk("stop"));
        let late = converter.on_chunk(&delta_chunk("ignored"));
        assert!(late.is_empty());

        let trailer = converter.finish();
        let StreamEvent::ResponseCompleted { response, .. } = trailer.last().unwrap() else {
            panic!("expected response.completed");
        };
        let OutputItem::Message(item) = &response.output[0] else {
            panic!("expected message item");
        };
        assert_eq!(item.text(), "Hi");
    }

    #[test]
    fn missing_finish_reason_gets_synthetic_stop_at_close() {
        let mut converter = StreamConverter::new("gpt-4");
        converter.begin();
        converter.on_chunk(&delta_chunk("partial"));
        let trailer = converter.finish();

        assert_eq!(
            event_types(&trailer),
            vec![
                "response.output_text.done",
                "response.output_item.done",
                "response.completed",
            ]
        );
        let StreamEvent::OutputTextDone { text, .. } = &trailer[0] else {
            panic!("expected output_text.done");
        };
        assert_eq!(text, "partial");
    }

    #[test]
    fn empty_stream_still_yields_nonempty_output() {
        let mut converter = StreamConverter::new("gpt-4");
        converter.begin();
        let trailer = converter.finish();

        assert_eq!(
            event_types(&trailer),
            vec!["response.output_item.done", "response.completed"]
        );
        let StreamEvent::ResponseCompleted { response, .. } = trailer.last().unwrap() else {
            panic!("expected response.completed");
        };
        assert_eq!(response.output.len(), 1);
    }

    #[test]
    fn multiple_choices_get_independent_lanes() {
        let chunk = chat_chunk(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "gpt-4",
            "choices": [
                {"index": 0, "delta": {"content": "A"}, "finish_reason": null},
                {"index": 1, "delta": {"content": "B"}, "finish_reason": null}
            ]
        }));

        let mut converter = StreamConverter::new("gpt-4");
        converter.begin();
        let events = converter.on_chunk(&chunk);

        let item_ids: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::OutputTextDelta {
                    item_id,
                    output_index,
                    ..
                } => Some((item_id.clone(), *output_index)),
                _ => None,
            })
            .collect();
        assert_eq!(item_ids.len(), 2);
        assert_ne!(item_ids[0].0, item_ids[1].0);
        assert_eq!(item_ids[0].1, 0);
        assert_eq!(item_ids[1].1, 1);
    }

    #[test]
    fn role_only_delta_opens_the_item() {
        let chunk = chat_chunk(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]
        }));

        let mut converter = StreamConverter::new("gpt-4");
        converter.begin();
        let events = converter.on_chunk(&chunk);
        assert_eq!(
            event_types(&events),
            vec![
                "response.output_item.added",
                "response.content_part.added",
            ]
        );
    }

    #[test]
    fn upstream_error_ends_without_completed() {
        let mut converter = StreamConverter::new("gpt-4");
        converter.begin();
        converter.on_chunk(&delta_chunk("He"));
        let events = converter.fail(&GatewayError::Upstream {
            status: Some(502),
            message: "bad gateway".into(),
        });

        assert_eq!(event_types(&events), vec!["error"]);
        // The converter refuses further work after failing.
        assert!(converter.finish().is_empty());
    }

    #[test]
    fn usage_from_final_chunk_lands_in_completed_response() {
        let usage_chunk = chat_chunk(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "gpt-4",
            "choices": [],
            "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}
        }));

        let mut converter = StreamConverter::new("gpt-4");
        converter.begin();
        converter.on_chunk(&delta_chunk("Hi"));
        converter.on_chunk(&usage_chunk);
        let trailer = converter.finish();

        let StreamEvent::ResponseCompleted { response, .. } = trailer.last().unwrap() else {
            panic!("expected response.completed");
        };
        let usage = response.usage.unwrap();
        assert_eq!(usage.total_tokens, 8);
        assert_eq!(usage.input_tokens + usage.output_tokens, usage.total_tokens);
    }
}
