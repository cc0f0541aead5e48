use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::ChatStream;

/// Resolve `host:port` to the socket addresses it names, in resolver order.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let authority = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            authority: authority.clone(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::Resolve {
            authority,
            source: std::io::Error::new(ErrorKind::NotFound, "no addresses found"),
        });
    }
    Ok(addrs)
}

/// A TCP socket bound to a local address but not yet listening.
///
/// Splitting bind from listen lets the caller choose the backlog and observe
/// bind failures (`AddressInUse`, `PermissionDenied`) separately.
pub struct BoundSocket {
    socket: Socket,
    local_addr: SocketAddr,
}

impl BoundSocket {
    /// Create a TCP socket and bind it to `addr`.
    ///
    /// `SO_REUSEADDR` is left unset: a port held by another socket fails here
    /// with `AddressInUse`, whether or not that socket is listening yet.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|source| TransportError::Bind { addr, source })?;
        socket
            .bind(&addr.into())
            .map_err(|source| classify_bind_error(addr, source))?;

        let local_addr = socket
            .local_addr()
            .ok()
            .and_then(|sock| sock.as_socket())
            .unwrap_or(addr);

        debug!(%local_addr, "bound tcp socket");
        Ok(Self { socket, local_addr })
    }

    /// Start listening, queueing at most `backlog` pending connections.
    pub fn listen(self, backlog: i32) -> Result<ChatListener> {
        let addr = self.local_addr;
        self.socket
            .listen(backlog)
            .map_err(|source| match source.kind() {
                ErrorKind::AddrInUse => TransportError::AddressInUse { addr, source },
                _ => TransportError::Listen { addr, source },
            })?;
        info!(%addr, backlog, "listening for chat peer");

        Ok(ChatListener {
            listener: self.socket.into(),
            local_addr: addr,
        })
    }

    /// The address this socket is bound to (with the OS-assigned port if 0 was requested).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// A listening TCP socket that accepts chat peers.
pub struct ChatListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ChatListener {
    /// Bind and listen in one step.
    pub fn bind(addr: SocketAddr, backlog: i32) -> Result<Self> {
        BoundSocket::bind(addr)?.listen(backlog)
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<ChatStream> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    debug!(%peer_addr, "accepted connection");
                    return Ok(ChatStream::from_tcp(stream, peer_addr));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn classify_bind_error(addr: SocketAddr, source: std::io::Error) -> TransportError {
    match source.kind() {
        ErrorKind::AddrInUse => TransportError::AddressInUse { addr, source },
        ErrorKind::PermissionDenied => TransportError::PermissionDenied { addr, source },
        _ => TransportError::Bind { addr, source },
    }
}
