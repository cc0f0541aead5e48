//! Chat sessions between exactly one server and one client.
//!
//! - [`ServerEndpoint`] binds, listens and accepts a single peer.
//! - [`ClientEndpoint`] connects with a bounded [`RetryPolicy`].
//! - [`Session`] is the established connection, owned by whichever endpoint made it.
//! - [`DuplexLoop`] reads inbound messages on a dedicated thread while the
//!   calling thread sends outbound ones.

pub mod client;
pub mod duplex;
pub mod error;
pub mod server;
pub mod session;

pub use client::{Backoff, ClientEndpoint, ClientState, RetryEvent, RetryPolicy};
pub use duplex::{
    DuplexConfig, DuplexLoop, DuplexSummary, ExitPolicy, InboundSink, LineSource, ReaderExit,
    ReaderHandle, ReaderReport, WriterExit, DEFAULT_READ_TIMEOUT,
};
pub use error::{Result, SessionError};
pub use server::{ServerEndpoint, ServerState, DEFAULT_BACKLOG, MAX_BACKLOG};
pub use session::{Session, SessionState, ShutdownHandle};
