//! Newline-delimited text codec for the chat protocol

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::P2PError;
use crate::protocols::{LINE_TERMINATOR, MAX_LINE_LENGTH};

/// Splits an inbound byte stream into text units.
///
/// Each unit keeps its terminating `\n`; a trailing fragment without a
/// terminator is yielded unchanged once the stream ends. Invalid UTF-8 is
/// replaced rather than rejected.
#[derive(Debug, Clone)]
pub struct ChatCodec {
    max_length: usize,
    next_index: usize,
}

impl ChatCodec {
    /// Create a codec that rejects lines longer than `max_length` bytes
    #[must_use]
    pub const fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }
}

impl Default for ChatCodec {
    fn default() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }
}

impl Decoder for ChatCodec {
    type Item = String;
    type Error = P2PError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, P2PError> {
        let scan_end = src.len().min(self.max_length.saturating_add(1));
        let found = src[self.next_index..scan_end]
            .iter()
            .position(|b| *b == LINE_TERMINATOR);

        match found {
            Some(offset) => {
                let line = src.split_to(self.next_index + offset + 1);
                self.next_index = 0;
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None if src.len() > self.max_length => Err(P2PError::Protocol(format!(
                "line exceeds {} bytes",
                self.max_length
            ))),
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, P2PError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() {
            Ok(None)
        } else {
            let rest = src.split();
            Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
        }
    }
}

/// Encode an outbound message as one wire line.
///
/// A terminator is always appended, even when `text` already ends with one.
#[must_use]
pub fn encode_line(text: &str) -> Bytes {
    let mut line = BytesMut::with_capacity(text.len() + 1);
    line.extend_from_slice(text.as_bytes());
    line.extend_from_slice(&[LINE_TERMINATOR]);
    line.freeze()
}

/// Text of an inbound unit as shown in logs: exactly one trailing `\n` removed.
#[must_use]
pub fn display_text(text: &str) -> &str {
    text.strip_suffix('\n').unwrap_or(text)
}
