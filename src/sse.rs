//! Server-Sent Events (SSE) decoding.
//!
//! [`SseDecoder`] turns an incrementally arriving byte stream into discrete
//! [`StreamEvent`]s. It is pull-based: bytes are pushed as they arrive and
//! frames are pulled out one at a time, so the decoder only advances when the
//! consumer asks for the next event.
//!
//! SSE format:
//! ```text
//! event: message
//! data: {"key": "value"}
//!
//! data: {"another": "event"}
//!
//! data: [DONE]
//! ```

use itertools::Itertools;
use serde_json::Value;
use tracing::debug;

use crate::client::ClientError;

/// Terminal sentinel payload.
pub const DONE_MARKER: &str = "[DONE]";

/// Default bound on the bytes of one event, pending line included.
pub const DEFAULT_MAX_EVENT_SIZE: usize = 8 * 1024 * 1024;

/// One decoded event.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    /// Value of the `id:` field, if any.
    pub id: Option<String>,
    /// The JSON payload of the `data:` field(s).
    pub data: Value,
    /// Every line of the event as received, for diagnostics.
    pub raw: String,
}

impl StreamEvent {
    /// Event kind: the `event:` field, or the payload's `"event"` key.
    pub fn kind(&self) -> Option<&str> {
        self.event
            .as_deref()
            .or_else(|| self.data.get("event").and_then(Value::as_str))
    }
}

/// Output of the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(StreamEvent),
    /// The terminal sentinel was received.
    Done,
}

/// Incremental SSE decoder.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a newline.
    scanned: usize,
    event: Option<String>,
    id: Option<String>,
    data: Option<String>,
    raw: Vec<String>,
    /// Bytes of the lines collected for the current event.
    pending: usize,
    max_event_size: usize,
    terminated: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            event: None,
            id: None,
            data: None,
            raw: Vec::new(),
            pending: 0,
            max_event_size: DEFAULT_MAX_EVENT_SIZE,
            terminated: false,
        }
    }

    /// Bound the size of a single event. A stream exceeding it fails with
    /// [`ClientError::StreamOverflow`].
    pub fn with_max_event_size(mut self, limit: usize) -> Self {
        self.max_event_size = limit;
        self
    }

    /// Append newly received bytes. Ignored once the decoder has terminated.
    pub fn push(&mut self, chunk: &[u8]) {
        if !self.terminated {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Whether `[DONE]` or a decode error ended the stream.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Pull the next complete frame out of the buffered bytes.
    ///
    /// Returns `None` when more bytes are needed. A decode error terminates
    /// the decoder; nothing is produced afterwards.
    pub fn next_frame(&mut self) -> Option<Result<Frame, ClientError>> {
        while !self.terminated {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buffer.len();
                if self.pending + self.buffer.len() > self.max_event_size {
                    return Some(Err(self.overflow()));
                }
                return None;
            };
            let newline = self.scanned + offset;
            self.scanned = 0;

            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    return Some(frame);
                }
            } else {
                self.pending += line.len();
                if self.pending > self.max_event_size {
                    return Some(Err(self.overflow()));
                }
                self.process_line(line);
            }
        }
        None
    }

    /// Handle end of input.
    ///
    /// A trailing line without newline is processed as a line. Pending data
    /// that is `[DONE]` or valid JSON is flushed as a final frame; anything
    /// else is a truncated fragment and is dropped.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.terminated {
            return None;
        }
        self.terminated = true;

        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if !line.is_empty() {
                self.process_line(line);
            }
        }

        let data = self.data.take()?;
        let raw = self.raw.drain(..).join("\n");
        if data.trim().is_empty() {
            return None;
        }
        if data.trim() == DONE_MARKER {
            return Some(Frame::Done);
        }

        match serde_json::from_str::<Value>(&data) {
            Ok(value) => Some(Frame::Event(StreamEvent {
                event: self.event.take(),
                id: self.id.take(),
                data: value,
                raw,
            })),
            Err(error) => {
                debug!(fragment = %raw, %error, "discarding truncated trailing stream fragment");
                None
            }
        }
    }

    fn process_line(&mut self, line: String) {
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };

        match field {
            // comment, used as keep-alive
            "" => {}
            "data" => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }

        self.raw.push(line);
    }

    fn overflow(&mut self) -> ClientError {
        debug!(limit = self.max_event_size, "stream event exceeds size limit");
        self.terminated = true;
        self.buffer.clear();
        self.scanned = 0;
        self.pending = 0;
        self.raw.clear();
        self.data = None;
        ClientError::StreamOverflow {
            limit: self.max_event_size,
        }
    }

    fn dispatch(&mut self) -> Option<Result<Frame, ClientError>> {
        self.pending = 0;
        let event = self.event.take();
        let id = self.id.take();
        let raw = self.raw.drain(..).join("\n");
        let data = self.data.take()?;

        if data.trim().is_empty() {
            return None;
        }

        if data.trim() == DONE_MARKER {
            self.terminated = true;
            self.buffer.clear();
            return Some(Ok(Frame::Done));
        }

        match serde_json::from_str::<Value>(&data) {
            Ok(value) => Some(Ok(Frame::Event(StreamEvent {
                event,
                id,
                data: value,
                raw,
            }))),
            Err(source) => {
                self.terminated = true;
                self.buffer.clear();
                Some(Err(ClientError::StreamDecode {
                    message: format!("event data is not valid JSON: {source}"),
                    raw,
                    source,
                }))
            }
        }
    }
}

/// Decode a complete payload in one shot, stopping at the first error.
pub fn decode_all(input: &[u8]) -> Result<Vec<StreamEvent>, ClientError> {
    let mut decoder = SseDecoder::new();
    decoder.push(input);

    let mut events = Vec::new();
    while let Some(frame) = decoder.next_frame() {
        match frame? {
            Frame::Event(event) => events.push(event),
            Frame::Done => return Ok(events),
        }
    }
    if let Some(Frame::Event(event)) = decoder.finish() {
        events.push(event);
    }
    Ok(events)
}
