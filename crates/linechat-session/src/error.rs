use std::net::SocketAddr;

use crate::session::SessionState;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] linechat_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] linechat_frame::FrameError),

    /// Connection parameters could not be resolved.
    #[error("config error: {0}")]
    Config(#[from] linechat_config::ConfigError),

    /// The server port is already bound by another socket.
    #[error("address {addr} already in use")]
    AddressInUse {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The server port requires elevated privilege.
    #[error("permission denied binding {addr}")]
    PermissionDenied {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The client gave up after exhausting its retry policy.
    #[error("could not connect to {authority} after {attempts} attempt(s): {source}")]
    ConnectionFailed {
        authority: String,
        attempts: u32,
        source: linechat_transport::TransportError,
    },

    /// A message was sent on a session that is not connected.
    #[error("session is not connected (state: {state})")]
    NotConnected { state: SessionState },

    /// The endpoint already owns a live session.
    #[error("endpoint already has a connected session")]
    AlreadyConnected,

    /// Listen backlog outside the supported range.
    #[error("listen backlog {backlog} out of range (1..={max})")]
    InvalidBacklog { backlog: u32, max: u32 },

    /// Operation called out of order.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// Retry policy values out of range.
    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
