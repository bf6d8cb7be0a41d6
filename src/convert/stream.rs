//! Streaming chat-chunk → semantic-event conversion.
//!
//! One [`StreamConverter`] is created per streamed response and driven by
//! the pipeline: `begin` emits the preamble, `on_chunk` maps each upstream
//! chat chunk, and `finish`/`fail` emit the trailer. Sequence numbers are
//! pre-assigned here so replaying the same upstream chunks yields an
//! identical event stream.

use std::collections::HashMap;

use crate::convert::usage_to_semantic;
use crate::error::GatewayError;
use crate::wire::chat::ChatCompletionChunk;
use crate::wire::semantic::{
    MessageItem, OutputContent, OutputItem, Response, ResponseStatus, ResponseUsage, StreamEvent,
    message_id, new_response_id,
};

/// Per-choice conversion state. Each upstream choice index gets its own
/// output lane with a stable item id; lanes are ordered by first arrival.
#[derive(Debug)]
struct Lane {
    output_index: u64,
    item_id: String,
    item_added: bool,
    accumulated: String,
    finished: bool,
}

/// Stateful converter for one streamed response.
#[derive(Debug)]
pub struct StreamConverter {
    response_id: String,
    model: String,
    created_at: i64,
    sequence: u64,
    lanes: Vec<Lane>,
    by_choice: HashMap<u32, usize>,
    usage: Option<ResponseUsage>,
    finished: bool,
}

impl StreamConverter {
    /// Creates a converter with a fresh response id.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            response_id: new_response_id(),
            model: model.into(),
            created_at: chrono::Utc::now().timestamp(),
            sequence: 0,
            lanes: Vec::new(),
            by_choice: HashMap::new(),
            usage: None,
            finished: false,
        }
    }

    /// The id of the response under construction.
    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    /// Emits the preamble: `response.created` then `response.in_progress`.
    pub fn begin(&mut self) -> Vec<StreamEvent> {
        vec![
            StreamEvent::ResponseCreated {
                sequence_number: self.next_sequence(),
                response: self.snapshot(ResponseStatus::InProgress),
            },
            StreamEvent::ResponseInProgress {
                sequence_number: self.next_sequence(),
                response: self.snapshot(ResponseStatus::InProgress),
            },
        ]
    }

    /// Maps one upstream chat chunk to zero or more semantic events.
    pub fn on_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage_to_semantic(usage));
        }

        for choice in &chunk.choices {
            let lane_index = self.lane_index(choice.index);

            if self.lanes[lane_index].finished {
                // Deltas arriving after finish_reason are discarded.
                continue;
            }

            if !self.lanes[lane_index].item_added && !choice.delta.is_empty() {
                let lane = &self.lanes[lane_index];
                let item = MessageItem::in_progress(lane.item_id.clone());
                let output_index = lane.output_index;
                let item_id = lane.item_id.clone();
                events.push(StreamEvent::OutputItemAdded {
                    sequence_number: self.next_sequence(),
                    output_index,
                    item: OutputItem::Message(item),
                });
                events.push(StreamEvent::ContentPartAdded {
                    sequence_number: self.next_sequence(),
                    item_id,
                    output_index,
                    content_index: 0,
                    part: OutputContent::empty_text(),
                });
                self.lanes[lane_index].item_added = true;
            }

            if let Some(content) = choice.delta.content.as_deref() {
                if !content.is_empty() {
                    let lane = &self.lanes[lane_index];
                    let (item_id, output_index) = (lane.item_id.clone(), lane.output_index);
                    events.push(StreamEvent::OutputTextDelta {
                        sequence_number: self.next_sequence(),
                        item_id,
                        output_index,
                        content_index: 0,
                        delta: content.to_string(),
                    });
                    self.lanes[lane_index].accumulated.push_str(content);
                }
            }

            if let Some(reason) = choice.finish_reason.as_deref() {
                if !reason.is_empty() {
                    self.lanes[lane_index].finished = true;
                    if self.lanes[lane_index].item_added {
                        events.extend(self.close_lane(lane_index));
                    }
                }
            }
        }

        events
    }

    /// Emits the trailer: outstanding lanes are closed as if a synthetic
    /// `stop` arrived, an empty stream still yields a minimal completed
    /// message item, and `response.completed` carries the full output.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        for index in 0..self.lanes.len() {
            if !self.lanes[index].finished && self.lanes[index].item_added {
                self.lanes[index].finished = true;
                events.extend(self.close_lane(index));
            }
        }

        if !self.lanes.iter().any(|lane| lane.item_added) {
            let output_index = self.lanes.len() as u64;
            let item_id = message_id(&self.response_id, output_index);
            let item = MessageItem::completed_text(item_id.clone(), String::new());
            events.push(StreamEvent::OutputItemDone {
                sequence_number: self.next_sequence(),
                output_index,
                item: OutputItem::Message(item),
            });
            self.lanes.push(Lane {
                output_index,
                item_id,
                item_added: true,
                accumulated: String::new(),
                finished: true,
            });
        }

        let mut response = self.snapshot(ResponseStatus::Completed);
        response.completed_at = Some(chrono::Utc::now().timestamp());
        response.usage = Some(self.usage.unwrap_or_default());
        events.push(StreamEvent::ResponseCompleted {
            sequence_number: self.next_sequence(),
            response,
        });
        events
    }

    /// Emits the terminal `error` event for an upstream failure. No
    /// `response.completed` follows; the caller writes `[DONE]` and closes.
    pub fn fail(&mut self, error: &GatewayError) -> Vec<StreamEvent> {
        self.finished = true;
        vec![StreamEvent::Error {
            sequence_number: self.next_sequence(),
            code: Some(
                error
                    .error_code()
                    .unwrap_or_else(|| error.error_type())
                    .to_string(),
            ),
            message: error.to_string(),
            param: error.error_param().map(str::to_string),
        }]
    }

    /// Usage accumulated from upstream chunks, when any was reported.
    pub fn usage(&self) -> Option<ResponseUsage> {
        self.usage
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn lane_index(&mut self, choice_index: u32) -> usize {
        if let Some(&index) = self.by_choice.get(&choice_index) {
            return index;
        }
        let output_index = self.lanes.len() as u64;
        let lane = Lane {
            output_index,
            item_id: message_id(&self.response_id, output_index),
            item_added: false,
            accumulated: String::new(),
            finished: false,
        };
        self.lanes.push(lane);
        let index = self.lanes.len() - 1;
        self.by_choice.insert(choice_index, index);
        index
    }

    fn close_lane(&mut self, index: usize) -> Vec<StreamEvent> {
        let (item_id, output_index, text) = {
            let lane = &self.lanes[index];
            (
                lane.item_id.clone(),
                lane.output_index,
                lane.accumulated.clone(),
            )
        };
        vec![
            StreamEvent::OutputTextDone {
                sequence_number: self.next_sequence(),
                item_id: item_id.clone(),
                output_index,
                content_index: 0,
                text: text.clone(),
            },
            StreamEvent::OutputItemDone {
                sequence_number: self.next_sequence(),
                output_index,
                item: OutputItem::Message(MessageItem::completed_text(item_id, text)),
            },
        ]
    }

    fn snapshot(&self, status: ResponseStatus) -> Response {
        let mut response = Response::new(self.response_id.clone(), self.model.clone(), self.created_at);
        response.status = status;
        response.output = self
            .lanes
            .iter()
            .filter(|lane| lane.item_added)
            .map(|lane| {
                OutputItem::Message(MessageItem::completed_text(
                    lane.item_id.clone(),
                    lane.accumulated.clone(),
                ))
            })
            .collect();
        response
    }
}
