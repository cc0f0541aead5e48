//! Newline-delimited message framing for linechat.
//!
//! Every chat message travels as UTF-8 text followed by exactly one `\n`:
//! - no length prefix, no escaping
//! - payloads may not contain `\n` themselves
//!
//! [`FrameReader`] owns the reassembly buffer, so callers always get whole
//! messages no matter how TCP splits or coalesces the bytes.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_LINE, DELIMITER};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
