//! TCP transport for linechat.
//!
//! Provides the socket-level pieces both chat endpoints build on:
//! - [`BoundSocket`] / [`ChatListener`]: bind, listen with a bounded backlog, accept
//! - [`ChatStream`]: a connected TCP stream implementing `Read + Write`
//!
//! This is the lowest layer of linechat. Framing and session state live above it.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::ChatStream;
pub use tcp::{resolve, BoundSocket, ChatListener};
