//! Incremental UTF-8 decoding for chunked reply bodies.
//!
//! Transports deliver bytes in arbitrary slices, so a multi-byte character
//! may straddle two chunks. [`Utf8StreamDecoder`] carries the incomplete
//! tail of one chunk into the next. Invalid sequences decode to U+FFFD
//! rather than failing the stream.

use std::char::REPLACEMENT_CHARACTER;

const BOM: char = '\u{FEFF}';

/// Stateful decoder for one reply stream.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    /// Incomplete trailing sequence from the previous chunk (at most 3 bytes).
    carry: Vec<u8>,
    /// Whether any text has been produced yet (BOM is only stripped at the start).
    started: bool,
}

impl Utf8StreamDecoder {
    /// Create a decoder for a fresh stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all text that is complete so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            self.carry = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        self.strip_bom(out)
    }

    /// Flush the decoder at end of stream.
    ///
    /// A dangling incomplete sequence yields a single U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        self.carry.clear();
        self.strip_bom(REPLACEMENT_CHARACTER.to_string())
    }

    /// Whether bytes are being held back waiting for the rest of a character.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.carry.is_empty()
    }

    fn strip_bom(&mut self, mut text: String) -> String {
        if !self.started && !text.is_empty() {
            self.started = true;
            if text.starts_with(BOM) {
                text.drain(..BOM.len_utf8());
            }
        }
        text
    }
}
