//! Message codec for newline-delimited JSON framing
//!
//! Every message is one UTF-8 JSON object followed by `\n`. A line that is
//! not JSON at all is surfaced as [`Frame::Malformed`]; valid JSON of the
//! wrong shape is surfaced as [`Frame::Invalid`] with whatever correlation id
//! it carried. Neither is a codec error, so a single bad line never tears
//! down the framed stream.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{Command, ServerFrame};

/// Maximum line length (16 MB)
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Line too long: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },
}

/// One decoded line
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    /// A well-formed message
    Message(T),
    /// A line that is not JSON; the stream stays usable
    Malformed { line: String, error: String },
    /// Valid JSON that is not a well-formed message
    ///
    /// `id` is the string `id` field, if the object had one, so the peer can
    /// still be answered.
    Invalid { id: Option<String>, error: String },
}

/// Shared line splitting state
///
/// Remembers how far the buffer has already been scanned for a newline so a
/// large message arriving in many reads is not rescanned from the start.
#[derive(Debug, Default)]
struct LineFramer {
    next_index: usize,
}

impl LineFramer {
    fn decode<T: DeserializeOwned>(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Frame<T>>, CodecError> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            let Some(pos) = newline else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(CodecError::LineTooLong {
                        size: src.len(),
                        max: MAX_LINE_LENGTH,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            self.next_index = 0;

            if pos > MAX_LINE_LENGTH {
                return Err(CodecError::LineTooLong {
                    size: pos,
                    max: MAX_LINE_LENGTH,
                });
            }

            let line = src.split_to(pos + 1);
            if let Some(frame) = parse_line(&line[..pos]) {
                return Ok(Some(frame));
            }
            // Blank line, keep going
        }
    }

    fn decode_eof<T: DeserializeOwned>(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Frame<T>>, CodecError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        // Final line without a trailing newline
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        Ok(parse_line(&rest))
    }
}

/// Parse one line (without its `\n`); `None` for blank lines
fn parse_line<T: DeserializeOwned>(raw: &[u8]) -> Option<Frame<T>> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }

    let value = match serde_json::from_slice::<Value>(raw) {
        Ok(value) => value,
        Err(e) => {
            return Some(Frame::Malformed {
                line: String::from_utf8_lossy(raw).into_owned(),
                error: e.to_string(),
            })
        }
    };

    let id = value
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(match serde_json::from_value::<T>(value) {
        Ok(msg) => Frame::Message(msg),
        Err(e) => Frame::Invalid {
            id,
            error: e.to_string(),
        },
    })
}

/// Serialize a message into one newline-terminated frame
///
/// Used wherever the same bytes go to many peers (push event broadcast) so
/// the message is serialized exactly once.
pub fn encode_line<T: Serialize>(item: &T) -> Result<Bytes, CodecError> {
    let mut data = serde_json::to_vec(item)?;

    if data.len() > MAX_LINE_LENGTH {
        return Err(CodecError::LineTooLong {
            size: data.len(),
            max: MAX_LINE_LENGTH,
        });
    }

    data.push(b'\n');
    Ok(Bytes::from(data))
}

fn encode_into<T: Serialize>(item: &T, dst: &mut BytesMut) -> Result<(), CodecError> {
    let line = encode_line(item)?;
    dst.reserve(line.len());
    dst.put_slice(&line);
    Ok(())
}

/// Codec for Command (encoding) and ServerFrame (decoding)
/// Used by the client side
#[derive(Debug, Default)]
pub struct ClientCodec {
    framer: LineFramer,
}

impl ClientCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ClientCodec {
    type Item = Frame<ServerFrame>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.framer.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.framer.decode_eof(src)
    }
}

impl Encoder<Command> for ClientCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&item, dst)
    }
}

/// Codec for decoding Commands
/// Used by the host side; outgoing frames are pre-encoded with [`encode_line`]
#[derive(Debug, Default)]
pub struct ServerCodec {
    framer: LineFramer,
}

impl ServerCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ServerCodec {
    type Item = Frame<Command>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.framer.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.framer.decode_eof(src)
    }
}
