//! Buffered decoder for `data:` lines of a provider's server-sent event stream

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{AppError, Result};

/// Splits incoming byte chunks into complete `data:` payloads.
///
/// Partial lines are kept until the next push. The buffer is capped so a
/// stream that never sends a newline cannot grow it without bound.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence split across chunks
    pending: Vec<u8>,
}

impl SseDecoder {
    const MAX_BUFFER_SIZE: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let bytes: Vec<u8> = self.pending.drain(..complete).collect();
        self.buffer.push_str(&String::from_utf8_lossy(&bytes));

        if self.buffer.len() > Self::MAX_BUFFER_SIZE {
            warn!(
                limit_kb = Self::MAX_BUFFER_SIZE / 1024,
                "SSE buffer over limit, dropping oldest data"
            );
            let mut keep_from = self.buffer.len() - Self::MAX_BUFFER_SIZE / 2;
            while !self.buffer.is_char_boundary(keep_from) {
                keep_from += 1;
            }
            self.buffer.drain(..keep_from);
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            // event:, id:, retry: and comments carry nothing we use
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.strip_prefix(' ').unwrap_or(data);
                if !data.is_empty() {
                    frames.push(SseFrame {
                        data: data.to_string(),
                    });
                }
            }
        }

        frames
    }

    pub fn push_str(&mut self, s: &str) -> Vec<SseFrame> {
        self.push(s.as_bytes())
    }

    pub fn has_remaining(&self) -> bool {
        !self.buffer.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub data: String,
}

impl SseFrame {
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).map_err(|e| {
            AppError::Provider(format!("bad stream frame: {e}. Data: {}", self.preview()))
        })
    }

    /// First 200 chars, for error messages
    pub fn preview(&self) -> String {
        match self.data.char_indices().nth(200) {
            Some((idx, _)) => format!("{}...", &self.data[..idx]),
            None => self.data.clone(),
        }
    }
}
