//! Server-Sent Events framing.
//!
//! The gateway only ever writes two frame shapes, a keep-alive comment and
//! a `data:` line carrying a JSON array of notifications. [`SseDecoder`] is
//! the reading side: it reassembles frames from arbitrarily split byte
//! chunks, which is how they arrive off a `reqwest` body.

use bytes::Bytes;

/// Keep-alive comment frame.
pub const PING_FRAME: &[u8] = b": ping\n\n";

/// Encode a single `data:` event. `json` must be single-line (serde_json's
/// compact encoding always is).
pub fn data_frame(json: &str) -> Bytes {
    let mut buf = Vec::with_capacity(json.len() + 8);
    buf.extend_from_slice(b"data: ");
    buf.extend_from_slice(json.as_bytes());
    buf.extend_from_slice(b"\n\n");
    Bytes::from(buf)
}

/// A fully received SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// `: text` comment line, keep-alives included.
    Comment(String),
    /// Event payload; multi-line `data:` fields are joined with `\n`.
    Data(String),
}

/// Incremental SSE parser.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current, not yet terminated line.
    pending: Vec<u8>,
    /// `data:` lines of the event being assembled.
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.push_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Process one line (without its terminator).
    fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        // Blank line dispatches the event being assembled
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            return Some(SseFrame::Data(std::mem::take(&mut self.data).join("\n")));
        }

        if let Some(comment) = line.strip_prefix(':') {
            return Some(SseFrame::Comment(comment.trim_start().to_string()));
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        // `event:`, `id:` and `retry:` carry nothing the pipeline uses
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}
