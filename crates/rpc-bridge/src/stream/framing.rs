//! Synchronous frame reassembly for separator-delimited message streams.
//!
//! ```text
//!  chunk 1: {"rn          chunk 2: d":1};{"rnd":2};{"      chunk 3: rnd":3};
//!            │                    │      │       │                │
//!  buffer:  [{"rn] ──────▶ [{"rn, d":1] ─┴─ flush  {"rnd":2} flush [{", rnd":3] flush
//! ```
//!
//! Every separator crossed flushes the buffered fragments as one frame; the
//! text after the last separator stays buffered for the next chunk.

use super::StreamReadError;
use crate::codec::{parse_json_text, STREAM_JSON_SEPARATOR};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Decodes UTF-8 across chunk boundaries.
///
/// A multi-byte character split between two chunks is held back until the
/// rest arrives. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `pending + chunk` as forms complete characters.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    match e.error_len() {
                        Some(len) => {
                            out.push_str(&String::from_utf8_lossy(&rest[..valid + len]));
                            rest = &rest[valid + len..];
                        }
                        None => {
                            // Incomplete trailing character
                            out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                            self.pending = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush bytes held back at end of input.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

/// Reassembles frames and decodes each one into `T`.
///
/// `on_message` runs synchronously, once per completed frame, in frame order.
pub struct FrameDecoder<T> {
    separator: &'static str,
    buffered: Vec<String>,
    utf8: Utf8ChunkDecoder,
    _message: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> FrameDecoder<T> {
    pub fn new() -> Self {
        Self::with_separator(STREAM_JSON_SEPARATOR)
    }

    pub fn with_separator(separator: &'static str) -> Self {
        Self {
            separator,
            buffered: Vec::new(),
            utf8: Utf8ChunkDecoder::new(),
            _message: PhantomData,
        }
    }

    /// Feed raw bytes.
    pub fn feed(
        &mut self,
        chunk: &[u8],
        on_message: impl FnMut(T),
    ) -> Result<(), StreamReadError> {
        let text = self.utf8.decode(chunk);
        self.feed_text(&text, on_message)
    }

    /// Feed already-decoded text.
    pub fn feed_text(
        &mut self,
        chunk: &str,
        mut on_message: impl FnMut(T),
    ) -> Result<(), StreamReadError> {
        let mut pieces = chunk.split(self.separator).peekable();
        while let Some(piece) = pieces.next() {
            self.buffered.push(piece.to_string());
            if pieces.peek().is_some() {
                self.flush(&mut on_message)?;
            }
        }
        Ok(())
    }

    /// End of input: flush whatever is buffered, terminated or not.
    ///
    /// Calling it again emits nothing.
    pub fn finish(&mut self, mut on_message: impl FnMut(T)) -> Result<(), StreamReadError> {
        let tail = self.utf8.finish();
        if !tail.is_empty() {
            self.buffered.push(tail);
        }
        self.flush(&mut on_message)
    }

    /// Number of buffered fragments not yet flushed
    pub fn buffered_fragments(&self) -> usize {
        self.buffered.len()
    }

    fn flush(&mut self, on_message: &mut impl FnMut(T)) -> Result<(), StreamReadError> {
        let text = self.buffered.concat();
        self.buffered.clear();

        // Only exactly-empty frames are skipped; whitespace still gets parsed.
        if text.is_empty() {
            return Ok(());
        }

        let message = parse_json_text(&text).map_err(|source| StreamReadError::Decode {
            frame_len: text.len(),
            source,
        })?;
        on_message(message);
        Ok(())
    }
}

impl<T: DeserializeOwned> Default for FrameDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}
