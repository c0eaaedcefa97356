//! Incremental Server-Sent-Events parser.
//!
//! Bytes arrive in arbitrary chunks; the parser keeps partial lines and
//! partial UTF-8 sequences between calls and yields complete events.

/// Event type used when the server sends no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (`message` unless the server named it).
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event ID seen on the stream, if any.
    pub id: Option<String>,
}

/// Stateful parser for a `text/event-stream` body.
#[derive(Debug, Default)]
pub struct SseParser {
    undecoded: Vec<u8>,
    line: String,
    after_cr: bool,
    event: Option<String>,
    data: String,
    has_data: bool,
    last_id: Option<String>,
    retry_ms: Option<u64>,
}

impl SseParser {
    /// Create a parser with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconnection delay requested by the server, if any.
    #[must_use]
    pub const fn retry_ms(&self) -> Option<u64> {
        self.retry_ms
    }

    /// Feed raw bytes, returning every event completed by them.
    ///
    /// A UTF-8 sequence split across chunks is held back until the rest
    /// arrives; invalid sequences are replaced with U+FFFD.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.undecoded.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.undecoded) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.undecoded.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.undecoded[..valid_up_to]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.undecoded.drain(..valid_up_to);
                            break;
                        }
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.undecoded.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }
        self.push_str(&text)
    }

    /// Feed decoded text, returning every event completed by it.
    pub fn push_str(&mut self, text: &str) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for ch in text.chars() {
            match ch {
                '\n' if self.after_cr => {
                    self.after_cr = false;
                }
                '\r' | '\n' => {
                    self.after_cr = ch == '\r';
                    let line = std::mem::take(&mut self.line);
                    if let Some(event) = self.process_line(&line) {
                        events.push(event);
                    }
                }
                _ => {
                    self.after_cr = false;
                    self.line.push(ch);
                }
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse() {
                    self.retry_ms = Some(ms);
                }
            }
            other => tracing::trace!(field = other, "Ignoring unknown SSE field"),
        }
        None
    }

    /// Dispatch the pending event at a blank line.
    ///
    /// An event with neither data nor an explicit name is dropped. A named
    /// event without data (for example a bare `event: done`) is still
    /// dispatched, so terminal signals are not lost.
    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        let has_data = std::mem::replace(&mut self.has_data, false);

        if !has_data && event.is_none() {
            return None;
        }

        Some(SseEvent {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.last_id.clone(),
        })
    }
}
