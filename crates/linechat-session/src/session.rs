use std::fmt;
use std::net::{Shutdown, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use linechat_frame::{FrameConfig, FrameReader, FrameWriter};
use linechat_transport::ChatStream;
use tracing::{debug, info};

use crate::error::{Result, SessionError};

/// Lifecycle of one chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One established duplex TCP connection.
///
/// Owned by the endpoint that created it. Readers and writers hold shared
/// references but cannot close it; closing goes through the owning endpoint or
/// a [`ShutdownHandle`] it hands out.
pub struct Session {
    id: String,
    peer_addr: SocketAddr,
    state: Mutex<SessionState>,
    control: ChatStream,
    writer: Mutex<FrameWriter<ChatStream>>,
    frame_config: FrameConfig,
}

impl Session {
    /// Wrap a freshly connected stream. The session starts in `Connecting`.
    pub(crate) fn establish(
        id: String,
        stream: ChatStream,
        frame_config: FrameConfig,
    ) -> Result<Arc<Self>> {
        let peer_addr = stream.peer_addr();
        let writer = FrameWriter::with_config_chat(stream.try_clone()?, frame_config.clone())?;

        Ok(Arc::new(Self {
            id,
            peer_addr,
            state: Mutex::new(SessionState::Connecting),
            control: stream,
            writer: Mutex::new(writer),
            frame_config,
        }))
    }

    /// Session identifier used in logs (e.g. `server-1`).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Address of the remote endpoint.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Send one message as `text + "\n"`.
    ///
    /// Fails with [`SessionError::NotConnected`] unless the session is `Connected`.
    pub fn send(&self, text: &str) -> Result<()> {
        let state = self.state();
        if state != SessionState::Connected {
            return Err(SessionError::NotConnected { state });
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.send(text)?;
        debug!(session = %self.id, size = text.len(), "sent message");
        Ok(())
    }

    /// A frame reader over a second handle to the socket.
    pub(crate) fn reader(
        &self,
        read_timeout: Option<Duration>,
    ) -> Result<FrameReader<ChatStream>> {
        let config = FrameConfig {
            read_timeout,
            ..self.frame_config.clone()
        };
        Ok(FrameReader::with_config_chat(self.control.try_clone()?, config)?)
    }

    pub(crate) fn mark_connected(&self) {
        self.transition(SessionState::Connecting, SessionState::Connected);
        info!(session = %self.id, peer = %self.peer_addr, "session connected");
    }

    /// The peer ended the stream: `Connected -> Closing`.
    ///
    /// Returns false if the session had already left `Connected`.
    pub(crate) fn mark_peer_closed(&self) -> bool {
        let moved = self.transition(SessionState::Connected, SessionState::Closing);
        if moved {
            info!(session = %self.id, peer = %self.peer_addr, "peer closed the session");
        }
        moved
    }

    /// Stop sending; the peer sees end-of-stream while inbound traffic still flows.
    pub(crate) fn finish_writes(&self) -> Result<()> {
        self.control.shutdown(Shutdown::Write)?;
        debug!(session = %self.id, "write side closed");
        Ok(())
    }

    /// Close the socket and move to `Closed`. Safe to call repeatedly.
    pub(crate) fn close(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SessionState::Closed {
            return Ok(());
        }
        *state = SessionState::Closing;

        let result = self.control.shutdown(Shutdown::Both);
        *state = SessionState::Closed;
        drop(state);

        info!(session = %self.id, peer = %self.peer_addr, "session closed");
        result.map_err(Into::into)
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Closes a session from outside its owner, e.g. from a signal handler.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    session: Arc<Session>,
}

impl ShutdownHandle {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Close the session. Idempotent.
    pub fn shutdown(&self) -> Result<()> {
        self.session.close()
    }

    /// State of the session this handle controls.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }
}
