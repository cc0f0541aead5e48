//! Concurrent reader/writer pair over one [`Session`].
//!
//! The reader runs on a dedicated thread and hands each inbound message to an
//! [`InboundSink`]. The writer runs on the calling thread and pulls outbound
//! lines from a [`LineSource`] until it runs dry or the session leaves
//! `Connected`.

use std::fmt;
use std::io::{self, BufRead};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use linechat_frame::FrameError;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::session::{Session, SessionState};

/// Default read timeout; bounds how long the reader takes to notice a local close.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(250);

/// What the writer does with the reader once outbound input is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Half-close the write side and wait for the peer to finish.
    ///
    /// The wait has no upper bound unless [`DuplexConfig::linger`] is set: a
    /// peer that keeps its side open holds this thread until it sends
    /// end-of-stream or the session is closed (e.g. from a signal handler).
    #[default]
    Graceful,
    /// Return immediately and leave the reader running detached.
    Abandon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplexConfig {
    pub read_timeout: Option<Duration>,
    pub exit_policy: ExitPolicy,
    /// Longest a graceful exit waits for the peer before leaving the reader
    /// detached. `None` waits indefinitely.
    pub linger: Option<Duration>,
}

impl Default for DuplexConfig {
    fn default() -> Self {
        Self {
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            exit_policy: ExitPolicy::default(),
            linger: None,
        }
    }
}

/// Produces outbound lines. `Ok(None)` means end of input.
pub trait LineSource {
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

impl<R: BufRead> LineSource for R {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

/// Receives inbound messages, in arrival order, on the reader thread.
pub trait InboundSink: Send + 'static {
    fn deliver(&mut self, text: String);
}

impl<F> InboundSink for F
where
    F: FnMut(String) + Send + 'static,
{
    fn deliver(&mut self, text: String) {
        self(text)
    }
}

/// Why the reader stopped.
#[derive(Debug)]
pub enum ReaderExit {
    /// The peer ended the stream.
    PeerClosed,
    /// The session was closed locally.
    SessionClosed,
    /// An unexpected read error ended this session's loop.
    Failed(FrameError),
}

impl fmt::Display for ReaderExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderExit::PeerClosed => f.write_str("peer closed"),
            ReaderExit::SessionClosed => f.write_str("session closed"),
            ReaderExit::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

#[derive(Debug)]
pub struct ReaderReport {
    /// Messages handed to the sink.
    pub delivered: u64,
    pub exit: ReaderExit,
}

/// Why the writer stopped.
#[derive(Debug)]
pub enum WriterExit {
    /// The line source ran dry.
    EndOfInput,
    /// The session left `Connected` (peer or local close) and `unsent` could
    /// not be delivered. The caller may resend it on a new session.
    NotConnected { state: SessionState, unsent: String },
    /// Writing to the socket failed.
    SendFailed(SessionError),
    /// Reading from the line source failed.
    InputFailed(io::Error),
}

impl fmt::Display for WriterExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterExit::EndOfInput => f.write_str("end of input"),
            WriterExit::NotConnected { state, unsent } => {
                write!(f, "session {state}, message not sent: {unsent:?}")
            }
            WriterExit::SendFailed(err) => write!(f, "send failed: {err}"),
            WriterExit::InputFailed(err) => write!(f, "input failed: {err}"),
        }
    }
}

/// Outcome of [`DuplexLoop::run`].
#[derive(Debug)]
pub struct DuplexSummary {
    pub sent: u64,
    pub writer_exit: WriterExit,
    /// `None` when the reader was abandoned or outlived the linger period.
    pub reader: Option<ReaderReport>,
}

/// Join handle for the reader thread.
#[derive(Debug)]
pub struct ReaderHandle {
    thread: JoinHandle<()>,
    report: mpsc::Receiver<ReaderReport>,
}

impl ReaderHandle {
    /// Wait for the reader to stop.
    pub fn join(self) -> ReaderReport {
        match self.report.recv() {
            Ok(report) => {
                let _ = self.thread.join();
                report
            }
            Err(_) => Self::reraise(self.thread),
        }
    }

    /// Wait at most `timeout` for the reader to stop; hand the handle back otherwise.
    pub fn join_timeout(self, timeout: Duration) -> std::result::Result<ReaderReport, Self> {
        match self.report.recv_timeout(timeout) {
            Ok(report) => {
                let _ = self.thread.join();
                Ok(report)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => Err(self),
            Err(mpsc::RecvTimeoutError::Disconnected) => Ok(Self::reraise(self.thread)),
        }
    }

    // The sender only drops without a report if the reader panicked.
    fn reraise(thread: JoinHandle<()>) -> ReaderReport {
        match thread.join() {
            Ok(()) => ReaderReport {
                delivered: 0,
                exit: ReaderExit::SessionClosed,
            },
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Let the reader run on its own; it stops when the session closes.
    pub fn detach(self) {
        drop(self.thread);
    }
}

/// Runs one session's reader and writer.
#[derive(Debug)]
pub struct DuplexLoop {
    session: Arc<Session>,
    config: DuplexConfig,
}

impl DuplexLoop {
    pub fn new(session: Arc<Session>, config: DuplexConfig) -> Self {
        Self { session, config }
    }

    /// Start the reader thread.
    pub fn spawn_reader<K: InboundSink>(&self, sink: K) -> Result<ReaderHandle> {
        let reader = self.session.reader(self.config.read_timeout)?;
        let session = Arc::clone(&self.session);
        let (tx, report) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(format!("{}-reader", session.id()))
            .spawn(move || {
                let _ = tx.send(read_loop(&session, reader, sink));
            })
            .map_err(linechat_transport::TransportError::from)?;
        Ok(ReaderHandle { thread, report })
    }

    /// Send lines from `source` until it runs dry or the session stops accepting them.
    ///
    /// Returns the number of lines sent and why the writer stopped.
    pub fn run_writer<L: LineSource + ?Sized>(&self, source: &mut L) -> (u64, WriterExit) {
        let mut sent = 0u64;
        loop {
            let line = match source.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => return (sent, WriterExit::EndOfInput),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return (sent, WriterExit::InputFailed(err)),
            };

            match self.session.send(&line) {
                Ok(()) => sent += 1,
                Err(SessionError::NotConnected { state }) => {
                    warn!(
                        session = %self.session.id(),
                        %state,
                        unsent = %line,
                        "session no longer connected, message not sent"
                    );
                    return (sent, WriterExit::NotConnected { state, unsent: line });
                }
                Err(SessionError::Frame(
                    err @ (FrameError::EmbeddedNewline { .. } | FrameError::FrameTooLong { .. }),
                )) => {
                    warn!(session = %self.session.id(), error = %err, "line rejected");
                }
                Err(err) => return (sent, WriterExit::SendFailed(err)),
            }
        }
    }

    /// Spawn the reader, run the writer on this thread, then apply the exit policy.
    ///
    /// The session is left open; its owner closes it.
    pub fn run<L, K>(&self, source: &mut L, sink: K) -> Result<DuplexSummary>
    where
        L: LineSource + ?Sized,
        K: InboundSink,
    {
        let reader = self.spawn_reader(sink)?;
        let (sent, writer_exit) = self.run_writer(source);
        info!(session = %self.session.id(), sent, exit = %writer_exit, "writer finished");

        let reader = match self.config.exit_policy {
            ExitPolicy::Graceful => {
                // A peer that already ended its side is still waiting for ours.
                if self.session.state() != SessionState::Closed {
                    if let Err(err) = self.session.finish_writes() {
                        warn!(session = %self.session.id(), error = %err, "half-close failed");
                    }
                }
                let report = match self.config.linger {
                    None => Some(reader.join()),
                    Some(linger) => match reader.join_timeout(linger) {
                        Ok(report) => Some(report),
                        Err(reader) => {
                            warn!(
                                session = %self.session.id(),
                                linger_ms = linger.as_millis() as u64,
                                "peer still open after linger, leaving reader detached"
                            );
                            reader.detach();
                            None
                        }
                    },
                };
                if let Some(report) = &report {
                    info!(
                        session = %self.session.id(),
                        delivered = report.delivered,
                        exit = %report.exit,
                        "reader finished"
                    );
                }
                report
            }
            ExitPolicy::Abandon => {
                reader.detach();
                None
            }
        };

        Ok(DuplexSummary {
            sent,
            writer_exit,
            reader,
        })
    }
}

fn read_loop<K: InboundSink>(
    session: &Session,
    mut reader: linechat_frame::FrameReader<linechat_transport::ChatStream>,
    mut sink: K,
) -> ReaderReport {
    let mut delivered = 0u64;
    let exit = loop {
        match reader.read_frame() {
            Ok(frame) => {
                delivered += 1;
                sink.deliver(frame.text);
            }
            Err(err) if err.is_timeout() => {
                if session.state() == SessionState::Closed {
                    break ReaderExit::SessionClosed;
                }
            }
            Err(FrameError::ConnectionClosed) => break peer_or_local_close(session),
            Err(FrameError::IncompleteFrame { pending }) => {
                warn!(session = %session.id(), pending, "peer closed mid-message");
                break peer_or_local_close(session);
            }
            Err(FrameError::InvalidUtf8(err)) => {
                warn!(session = %session.id(), error = %err, "dropping message that is not UTF-8");
            }
            Err(err) => {
                if session.state() == SessionState::Closed {
                    break ReaderExit::SessionClosed;
                }
                warn!(session = %session.id(), error = %err, "reader failed");
                break ReaderExit::Failed(err);
            }
        }
    };
    debug!(session = %session.id(), delivered, exit = %exit, "reader stopped");
    ReaderReport { delivered, exit }
}

fn peer_or_local_close(session: &Session) -> ReaderExit {
    if session.mark_peer_closed() {
        return ReaderExit::PeerClosed;
    }
    match session.state() {
        SessionState::Closed => ReaderExit::SessionClosed,
        _ => ReaderExit::PeerClosed,
    }
}
