//! Re-framing of provider response bodies into audio chunks.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tracing::debug;

use super::error::{Result, TtsError};

/// Default window size for relayed audio bodies (16 KiB).
pub const DEFAULT_WINDOW_SIZE: usize = 16 * 1024;

/// Regroups arbitrary transport reads into fixed-size windows.
///
/// Every window except the last is exactly `window_size` bytes. Byte order is preserved.
#[derive(Debug)]
pub struct ByteWindows {
    window_size: usize,
    pending: BytesMut,
}

impl ByteWindows {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self { window_size, pending: BytesMut::with_capacity(window_size) }
    }

    /// Add transport bytes and return every window completed by them.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(data);
        let mut windows = Vec::new();
        while self.pending.len() >= self.window_size {
            windows.push(self.pending.split_to(self.window_size).freeze());
        }
        windows
    }

    /// Flush the trailing partial window, if any.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.pending.is_empty() { None } else { Some(self.pending.split().freeze()) }
    }
}

/// Decodes newline-delimited JSON audio messages into raw audio.
///
/// Each line holds one JSON object whose `audio` field is base64. Lines may carry an SSE
/// `data:` prefix. Blank lines, SSE comments and `[DONE]` markers are skipped. An object with
/// an `error` field (or `"type": "error"`) becomes [`TtsError::Upstream`].
#[derive(Debug)]
pub struct JsonLineDecoder {
    provider: &'static str,
    pending: BytesMut,
}

impl JsonLineDecoder {
    pub fn new(provider: &'static str) -> Self {
        Self { provider, pending: BytesMut::new() }
    }

    /// Add transport bytes and decode every complete line.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.pending.extend_from_slice(data);
        let mut audio = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line = self.pending.split_to(newline + 1);
            if let Some(chunk) = self.decode_line(&line)? {
                audio.push(chunk);
            }
        }
        Ok(audio)
    }

    /// Decode a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Result<Option<Bytes>> {
        let line = self.pending.split();
        self.decode_line(&line)
    }

    fn decode_line(&self, raw: &[u8]) -> Result<Option<Bytes>> {
        let line = std::str::from_utf8(raw).map_err(|_| self.malformed("line is not UTF-8"))?.trim();
        let line = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
        if line.is_empty() || line.starts_with(':') || line.starts_with("event:") || line == "[DONE]" {
            return Ok(None);
        }

        let message: Value = serde_json::from_str(line).map_err(|e| self.malformed(&format!("invalid JSON line: {}", e)))?;

        if let Some(err) = message.get("error").filter(|e| !e.is_null()) {
            let text = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
            return Err(TtsError::Upstream { provider: self.provider, status: 200, message: text });
        }
        if message.get("type").and_then(Value::as_str) == Some("error") {
            let text = message.get("message").and_then(Value::as_str).unwrap_or("stream reported an error");
            return Err(TtsError::Upstream { provider: self.provider, status: 200, message: text.to_string() });
        }

        let Some(encoded) = message.get("audio").and_then(Value::as_str) else {
            debug!("Skipping {} message without audio", self.provider);
            return Ok(None);
        };
        let audio = BASE64.decode(encoded).map_err(|e| self.malformed(&format!("invalid base64 audio: {}", e)))?;
        Ok((!audio.is_empty()).then(|| Bytes::from(audio)))
    }

    fn malformed(&self, reason: &str) -> TtsError {
        TtsError::Upstream { provider: self.provider, status: 200, message: reason.to_string() }
    }
}
