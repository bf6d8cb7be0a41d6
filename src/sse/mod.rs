//! Server-sent-event plumbing: an incremental decoder for upstream byte
//! streams and a frame writer for the client-facing stream.

use bytes::Bytes;

use crate::error::GatewayError;
use crate::wire::semantic::StreamEvent;

/// Sentinel data payload terminating an SSE stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, when present.
    pub event: Option<String>,
    /// Concatenated `data:` lines, joined with `\n`.
    pub data: String,
}

impl SseFrame {
    /// Whether this frame is the `[DONE]` terminator.
    pub fn is_done(&self) -> bool {
        self.data == DONE_SENTINEL
    }
}

/// Incremental SSE tokenizer.
///
/// Feed raw upstream bytes with [`SseDecoder::push`]; completed frames come
/// back in arrival order. Handles LF and CRLF line endings, skips `:`
/// comment lines, and joins multi-line `data:` segments with `\n`. Partial
/// lines are buffered across pushes.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a byte chunk, returning every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            // Blank line dispatches the accumulated frame, if any.
            if self.event.is_none() && self.data.is_empty() {
                return None;
            }
            let frame = SseFrame {
                event: self.event.take(),
                data: self.data.join("\n"),
            };
            self.data.clear();
            return Some(frame);
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            // A field name with no colon has an empty value.
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and `retry` carry no meaning for this gateway.
            _ => {}
        }
        None
    }
}

/// Serializes semantic events into client-facing SSE frames.
///
/// The writer auto-assigns `sequence_number` to events that arrive with 0,
/// continuing from the highest number it has seen. It is intentionally not
/// synchronized: exactly one pipeline writes a given response.
#[derive(Debug)]
pub struct SseWriter {
    next_sequence: u64,
}

impl SseWriter {
    /// Creates a writer; auto-assigned sequence numbers start at 1.
    pub fn new() -> Self {
        Self { next_sequence: 1 }
    }

    /// Serializes an event, assigning a sequence number when the producer
    /// left it zero. Returns the SSE `event:` name and the JSON payload.
    pub fn serialize(&mut self, event: &mut StreamEvent) -> Result<(&'static str, Bytes), GatewayError> {
        if event.sequence_number() == 0 {
            event.set_sequence_number(self.next_sequence);
        }
        self.next_sequence = event.sequence_number() + 1;
        let json = serde_json::to_vec(event)?;
        Ok((event.event_type(), Bytes::from(json)))
    }

    /// Builds a named frame: `event: <name>\ndata: <payload>\n\n`.
    pub fn frame(event_name: &str, data: &[u8]) -> Bytes {
        let mut out = Vec::with_capacity(event_name.len() + data.len() + 16);
        out.extend_from_slice(b"event: ");
        out.extend_from_slice(event_name.as_bytes());
        out.extend_from_slice(b"\ndata: ");
        out.extend_from_slice(data);
        out.extend_from_slice(b"\n\n");
        Bytes::from(out)
    }

    /// Builds a bare data frame: `data: <payload>\n\n`.
    pub fn data_frame(data: &[u8]) -> Bytes {
        let mut out = Vec::with_capacity(data.len() + 10);
        out.extend_from_slice(b"data: ");
        out.extend_from_slice(data);
        out.extend_from_slice(b"\n\n");
        Bytes::from(out)
    }

    /// The terminal `data: [DONE]\n\n` frame.
    pub fn done_frame() -> Bytes {
        Bytes::from_static(b"data: [DONE]\n\n")
    }
}

impl Default for SseWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunks: &[&str]) -> Vec<SseFrame> {
        let mut decoder = SseDecoder::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(decoder.push(chunk.as_bytes()));
        }
        frames
    }

    #[test]
    fn decodes_simple_data_frames() {
        let frames = collect(&["data: {\"a\":1}\n\ndata: [DONE]\n\n"]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "{\"a\":1}");
        assert!(frames[0].event.is_none());
        assert!(frames[1].is_done());
    }

    #[test]
    fn decodes_named_events_and_crlf() {
        let frames = collect(&["event: response.created\r\ndata: {}\r\n\r\n"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("response.created"));
        assert_eq!(frames[0].data, "{}");
    }

    #[test]
    fn joins_multiline_data_with_newline() {
        let frames = collect(&["data: line one\ndata: line two\n\n"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "line one\nline two");
    }

    #[test]
    fn skips_comment_lines() {
        let frames = collect(&[": keep-alive\n\ndata: x\n\n"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn reassembles_frames_split_across_pushes() {
        let frames = collect(&["data: {\"del", "ta\":\"He\"}", "\n\nda", "ta: [DONE]\n\n"]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "{\"delta\":\"He\"}");
        assert!(frames[1].is_done());
    }

    #[test]
    fn value_without_leading_space_is_accepted() {
        let frames = collect(&["data:{\"a\":1}\n\n"]);
        assert_eq!(frames[0].data, "{\"a\":1}");
    }

    #[test]
    fn writer_auto_assigns_zero_sequence_numbers() {
        let mut writer = SseWriter::new();
        let mut first = StreamEvent::OutputTextDelta {
            sequence_number: 0,
            item_id: "msg_1".into(),
            output_index: 0,
            content_index: 0,
            delta: "a".into(),
        };
        let (_, payload) = writer.serialize(&mut first).unwrap();
        assert_eq!(first.sequence_number(), 1);
        let parsed: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(parsed["sequence_number"], 1);

        // Pre-assigned numbers are left alone and advance the counter.
        let mut second = StreamEvent::OutputTextDelta {
            sequence_number: 9,
            item_id: "msg_1".into(),
            output_index: 0,
            content_index: 0,
            delta: "b".into(),
        };
        writer.serialize(&mut second).unwrap();
        assert_eq!(second.sequence_number(), 9);

        let mut third = StreamEvent::OutputTextDelta {
            sequence_number: 0,
            item_id: "msg_1".into(),
            output_index: 0,
            content_index: 0,
            delta: "c".into(),
        };
        writer.serialize(&mut third).unwrap();
        assert_eq!(third.sequence_number(), 10);
    }

    #[test]
    fn frames_are_wire_exact() {
        assert_eq!(
            SseWriter::frame("response.created", b"{}"),
            Bytes::from_static(b"event: response.created\ndata: {}\n\n")
        );
        assert_eq!(
            SseWriter::data_frame(b"{\"x\":1}"),
            Bytes::from_static(b"data: {\"x\":1}\n\n")
        );
        assert_eq!(SseWriter::done_frame(), Bytes::from_static(b"data: [DONE]\n\n"));
    }
}
