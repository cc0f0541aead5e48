use std::io::ErrorKind;
use std::net::SocketAddr;

/// Errors that can occur in TCP transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Another socket already owns the address.
    #[error("address {addr} already in use")]
    AddressInUse {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Binding the address requires elevated privilege.
    #[error("permission denied binding {addr}")]
    PermissionDenied {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to start listening on a bound socket.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The host name did not resolve to any socket address.
    #[error("failed to resolve {authority}: {source}")]
    Resolve {
        authority: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// The `io::ErrorKind` underneath this error.
    pub fn io_kind(&self) -> ErrorKind {
        match self {
            TransportError::AddressInUse { source, .. }
            | TransportError::PermissionDenied { source, .. }
            | TransportError::Bind { source, .. }
            | TransportError::Listen { source, .. }
            | TransportError::Connect { source, .. }
            | TransportError::Resolve { source, .. }
            | TransportError::Accept(source)
            | TransportError::Io(source) => source.kind(),
        }
    }

    /// Whether a failed connect attempt is worth repeating.
    ///
    /// Only refused, timed-out and unreachable connects are retried.
    pub fn is_retryable_connect(&self) -> bool {
        matches!(self, TransportError::Connect { .. })
            && matches!(
                self.io_kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::TimedOut
                    | ErrorKind::HostUnreachable
                    | ErrorKind::NetworkUnreachable
            )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
