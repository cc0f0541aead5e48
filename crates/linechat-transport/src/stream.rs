use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// A connected chat stream implementing `Read + Write`.
///
/// Wraps one TCP connection. Cloning with [`ChatStream::try_clone`] yields a
/// second handle to the same socket so one thread can read while another writes.
pub struct ChatStream {
    inner: TcpStream,
    peer_addr: SocketAddr,
}

impl Read for ChatStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for ChatStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl ChatStream {
    /// Wrap an accepted or connected TCP stream.
    pub(crate) fn from_tcp(inner: TcpStream, peer_addr: SocketAddr) -> Self {
        if let Err(err) = inner.set_nodelay(true) {
            debug!(%peer_addr, error = %err, "could not disable nagle");
        }
        Self { inner, peer_addr }
    }

    /// Connect to a listening chat server (blocking).
    ///
    /// With `timeout` set, the connect attempt gives up after that long with
    /// `ErrorKind::TimedOut`.
    pub fn connect(addr: SocketAddr, timeout: Option<Duration>) -> Result<Self> {
        let stream = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected to chat server");
        Ok(Self::from_tcp(stream, addr))
    }

    /// Address of the remote endpoint.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: cloned,
            peer_addr: self.peer_addr,
        })
    }

    /// Shut down one or both directions of the connection.
    ///
    /// Every clone observes the shutdown: a blocked read returns end-of-stream.
    /// Shutting down an already disconnected socket is not an error.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        match self.inner.shutdown(how) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}
