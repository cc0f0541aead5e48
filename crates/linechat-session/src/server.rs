use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use linechat_config::ConnectionConfig;
use linechat_frame::FrameConfig;
use linechat_transport::{BoundSocket, ChatListener, TransportError};
use tracing::{info, warn};

use crate::error::{Result, SessionError};
use crate::session::{Session, ShutdownHandle};

/// Backlog used when the caller does not choose one.
pub const DEFAULT_BACKLOG: u32 = 5;

/// Largest accepted backlog; the server only ever serves one peer.
pub const MAX_BACKLOG: u32 = 5;

/// Server-side lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Bound,
    Listening,
    Accepting,
    Connected,
    Closed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Idle => "idle",
            ServerState::Bound => "bound",
            ServerState::Listening => "listening",
            ServerState::Accepting => "accepting",
            ServerState::Connected => "connected",
            ServerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Binds, listens and accepts exactly one chat peer.
pub struct ServerEndpoint {
    state: ServerState,
    bound: Option<BoundSocket>,
    listener: Option<ChatListener>,
    local_addr: Option<SocketAddr>,
    session: Option<Arc<Session>>,
    frame_config: FrameConfig,
    accepted: u64,
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerEndpoint {
    pub fn new() -> Self {
        Self {
            state: ServerState::Idle,
            bound: None,
            listener: None,
            local_addr: None,
            session: None,
            frame_config: FrameConfig::default(),
            accepted: 0,
        }
    }

    /// Override framing limits and write timeout for accepted sessions.
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Bind to the configured host and port: `Idle -> Bound`.
    ///
    /// Tries each resolved address in order and returns the one bound.
    pub fn bind(&mut self, config: &ConnectionConfig) -> Result<SocketAddr> {
        self.expect_state("bind", ServerState::Idle)?;

        let addrs = linechat_transport::resolve(config.host(), config.port())?;
        let mut last_err = None;
        for addr in addrs {
            match BoundSocket::bind(addr) {
                Ok(bound) => {
                    let local = bound.local_addr();
                    self.bound = Some(bound);
                    self.local_addr = Some(local);
                    self.state = ServerState::Bound;
                    return Ok(local);
                }
                Err(err) => last_err = Some(err),
            }
        }

        // resolve() never returns an empty list
        Err(map_bind_error(last_err.unwrap_or_else(|| {
            TransportError::Io(std::io::Error::other("no address to bind"))
        })))
    }

    /// Start listening: `Bound -> Listening`.
    pub fn listen(&mut self, backlog: u32) -> Result<()> {
        self.expect_state("listen", ServerState::Bound)?;
        if backlog == 0 || backlog > MAX_BACKLOG {
            return Err(SessionError::InvalidBacklog {
                backlog,
                max: MAX_BACKLOG,
            });
        }

        let Some(bound) = self.bound.take() else {
            return Err(self.invalid_state("listen"));
        };
        // backlog <= MAX_BACKLOG, so the cast cannot truncate
        match bound.listen(backlog as i32) {
            Ok(listener) => self.listener = Some(listener),
            Err(err) => {
                self.state = ServerState::Idle;
                self.local_addr = None;
                return Err(map_bind_error(err));
            }
        }
        self.state = ServerState::Listening;
        Ok(())
    }

    /// Block until one peer connects: `Listening -> Accepting -> Connected`.
    pub fn accept(&mut self) -> Result<Arc<Session>> {
        if self.session.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        self.expect_state("accept", ServerState::Listening)?;
        let Some(listener) = self.listener.as_ref() else {
            return Err(self.invalid_state("accept"));
        };

        self.state = ServerState::Accepting;
        let stream = match listener.accept() {
            Ok(stream) => stream,
            Err(err) => {
                self.state = ServerState::Listening;
                return Err(err.into());
            }
        };

        self.accepted += 1;
        let session = Session::establish(
            format!("server-{}", self.accepted),
            stream,
            self.frame_config.clone(),
        )
        .inspect_err(|_| self.state = ServerState::Listening)?;
        session.mark_connected();
        info!(peer = %session.peer_addr(), "got connection from peer");

        self.session = Some(Arc::clone(&session));
        self.state = ServerState::Connected;
        Ok(session)
    }

    /// Close the current session and go back to `Listening` for the next peer.
    pub fn release_session(&mut self) -> Result<()> {
        self.expect_state("release session", ServerState::Connected)?;
        if let Some(session) = self.session.take() {
            session.close()?;
        }
        self.state = ServerState::Listening;
        Ok(())
    }

    /// Release the session and the listening socket. Idempotent.
    pub fn close(&mut self) {
        if self.state == ServerState::Closed {
            return;
        }
        if let Some(session) = self.session.take() {
            if let Err(err) = session.close() {
                warn!(error = %err, "error closing session");
            }
        }
        self.listener = None;
        self.bound = None;
        self.state = ServerState::Closed;
        info!("server closed");
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Address bound by [`bind`](Self::bind), if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The live session, if a peer is connected.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.clone()
    }

    /// A handle that can close the live session from another thread.
    pub fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        self.session.clone().map(ShutdownHandle::new)
    }

    fn expect_state(&self, operation: &'static str, expected: ServerState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }
}

impl Drop for ServerEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

fn map_bind_error(err: TransportError) -> SessionError {
    match err {
        TransportError::AddressInUse { addr, source } => {
            SessionError::AddressInUse { addr, source }
        }
        TransportError::PermissionDenied { addr, source } => {
            SessionError::PermissionDenied { addr, source }
        }
        other => other.into(),
    }
}
