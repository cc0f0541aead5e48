use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// The frame delimiter: a single line feed.
pub const DELIMITER: u8 = b'\n';

/// Default maximum payload length: 1 MiB.
pub const DEFAULT_MAX_LINE: usize = 1024 * 1024;

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message text, without the delimiter.
    pub text: String,
}

impl Frame {
    /// Create a new frame.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The total wire size of this frame (payload + delimiter).
    pub fn wire_size(&self) -> usize {
        self.text.len() + 1
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────────────────────┬───────────┐
/// │ Payload (UTF-8, no '\n')  │ '\n' (1B) │
/// └───────────────────────────┴───────────┘
/// ```
pub fn encode_frame(text: &str, dst: &mut BytesMut) -> Result<()> {
    if let Some(position) = text.bytes().position(|b| b == DELIMITER) {
        return Err(FrameError::EmbeddedNewline { position });
    }
    dst.reserve(text.len() + 1);
    dst.put_slice(text.as_bytes());
    dst.put_u8(DELIMITER);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a delimiter yet.
/// On success, consumes the frame bytes (and the delimiter) from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_line: usize) -> Result<Option<Frame>> {
    decode_frame_after(src, 0, max_line)
}

/// Like [`decode_frame`], but the first `scanned` bytes of `src` are known to
/// hold no delimiter and are skipped by the search.
pub(crate) fn decode_frame_after(
    src: &mut BytesMut,
    scanned: usize,
    max_line: usize,
) -> Result<Option<Frame>> {
    let start = scanned.min(src.len());
    let Some(end) = src[start..]
        .iter()
        .position(|&b| b == DELIMITER)
        .map(|offset| start + offset)
    else {
        if src.len() > max_line {
            return Err(FrameError::FrameTooLong {
                size: src.len(),
                max: max_line,
            });
        }
        return Ok(None); // Need more data
    };

    if end > max_line {
        return Err(FrameError::FrameTooLong {
            size: end,
            max: max_line,
        });
    }

    let line = src.split_to(end + 1);
    let text = String::from_utf8(line[..end].to_vec())?;
    Ok(Some(Frame { text }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload length in bytes. Default: 1 MiB.
    pub max_line_length: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
