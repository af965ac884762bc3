//! SSE (Server-Sent Events) parser
//!
//! Parses a backend's SSE wire format incrementally into normalized
//! stream events. Each `data:` payload is a JSON object tagged with
//! `type` (`thinking`/`delta`/`audio`/`done`/`error`).

use aigw_core::StreamEvent;
use bytes::Bytes;
use tracing::trace;

use crate::error::{ClientError, ClientResult};

/// Incremental SSE parser state
#[derive(Debug, Default)]
pub struct SseParser {
    /// Buffer for incomplete lines
    buffer: Vec<u8>,
    /// Current event data being accumulated
    data_buffer: String,
    /// Current event type (if any)
    event_type: Option<String>,
}

impl SseParser {
    /// Create a new SSE parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and extract any complete events
    pub fn feed(&mut self, bytes: Bytes) -> Vec<ClientResult<StreamEvent>> {
        let mut events = Vec::new();

        self.buffer.extend_from_slice(&bytes);

        loop {
            let newline_pos = self.buffer.iter().position(|&b| b == b'\n');

            match newline_pos {
                Some(pos) => {
                    let line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                    let line = &line[..line.len() - 1];

                    // Handle \r\n line endings
                    let line = if line.last() == Some(&b'\r') {
                        &line[..line.len() - 1]
                    } else {
                        line
                    };

                    if let Some(event) = self.process_line(line) {
                        events.push(event);
                    }
                }
                None => break, // No more complete lines
            }
        }

        events
    }

    /// Process a single line of SSE data
    fn process_line(&mut self, line: &[u8]) -> Option<ClientResult<StreamEvent>> {
        // Empty line signals end of event
        if line.is_empty() {
            return self.dispatch_event();
        }

        // Comment line (keepalive)
        if line.starts_with(b":") {
            trace!("SSE keepalive/comment");
            return None;
        }

        let line_str = match std::str::from_utf8(line) {
            Ok(s) => s,
            Err(_) => {
                return Some(Err(ClientError::Decode(
                    "invalid UTF-8 in SSE line".to_string(),
                )));
            }
        };

        // Split on first colon
        let (field, value) = if let Some(colon_pos) = line_str.find(':') {
            let (f, v) = line_str.split_at(colon_pos);
            let v = &v[1..];
            let v = v.strip_prefix(' ').unwrap_or(v);
            (f, v)
        } else {
            (line_str, "")
        };

        match field {
            "data" => {
                // Multiple data lines are joined with newlines
                if !self.data_buffer.is_empty() {
                    self.data_buffer.push('\n');
                }
                self.data_buffer.push_str(value);
            }
            "event" => {
                self.event_type = Some(value.to_string());
            }
            "id" | "retry" => {
                trace!(field, value, "ignored SSE field");
            }
            _ => {
                // Unknown field - ignore per SSE spec
                trace!(field, "unknown SSE field");
            }
        }

        None
    }

    /// Dispatch the accumulated event
    fn dispatch_event(&mut self) -> Option<ClientResult<StreamEvent>> {
        if self.data_buffer.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data_buffer);
        let _event_type = self.event_type.take();

        match serde_json::from_str::<StreamEvent>(&data) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                let preview = if data.len() > 100 {
                    format!("{}...", &data[..100])
                } else {
                    data.clone()
                };
                Some(Err(ClientError::Decode(format!(
                    "failed to parse event JSON: {} (data: {})",
                    e, preview
                ))))
            }
        }
    }
}
