use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use linechat_config::ConnectionConfig;
use linechat_frame::FrameConfig;
use linechat_transport::{ChatStream, TransportError};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::session::{Session, ShutdownHandle};

/// How the delay grows between connect attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles after each retry, capped at `max_delay`.
    Exponential { max_delay: Duration },
}

/// Bounded connect retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: Backoff,
    connect_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
            backoff: Backoff::Fixed,
            connect_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts >= 1` tries with `delay_seconds >= 0` between them.
    pub fn new(max_attempts: u32, delay_seconds: f64) -> Result<Self> {
        if max_attempts == 0 {
            return Err(SessionError::InvalidRetryPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        let delay = Duration::try_from_secs_f64(delay_seconds).map_err(|_| {
            SessionError::InvalidRetryPolicy(format!(
                "delay_seconds must be a finite number >= 0 (got {delay_seconds})"
            ))
        })?;

        Ok(Self {
            max_attempts,
            delay,
            ..Self::default()
        })
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Per-attempt connect timeout; `None` waits for the OS default.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => {
                let shift = attempt.saturating_sub(1).min(16);
                self.delay.saturating_mul(1 << shift).min(max_delay)
            }
        }
    }
}

/// Client-side lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Retrying,
    Connected,
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Idle => "idle",
            ClientState::Connecting => "connecting",
            ClientState::Retrying => "retrying",
            ClientState::Connected => "connected",
            ClientState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A failed attempt that will be retried.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub error: &'a TransportError,
}

type RetryObserver = Box<dyn FnMut(&RetryEvent<'_>) + Send>;

/// Connects to a chat server, retrying refused or unreachable attempts.
pub struct ClientEndpoint {
    state: ClientState,
    session: Option<Arc<Session>>,
    frame_config: FrameConfig,
    on_retry: Option<RetryObserver>,
    last_attempts: u32,
    connected: u64,
}

impl Default for ClientEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientEndpoint {
    pub fn new() -> Self {
        Self {
            state: ClientState::Idle,
            session: None,
            frame_config: FrameConfig::default(),
            on_retry: None,
            last_attempts: 0,
            connected: 0,
        }
    }

    /// Override framing limits and write timeout for the session.
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Called after each failed attempt that will be retried, before the delay.
    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: FnMut(&RetryEvent<'_>) + Send + 'static,
    {
        self.on_retry = Some(Box::new(observer));
        self
    }

    /// Connect with retries: `Idle -> Connecting (-> Retrying)* -> Connected`.
    ///
    /// Refused, timed-out and unreachable attempts are retried up to
    /// `policy.max_attempts()`; any other failure ends the attempt loop at once.
    /// On failure the endpoint returns to `Idle` and may connect again.
    pub fn connect(
        &mut self,
        config: &ConnectionConfig,
        policy: &RetryPolicy,
    ) -> Result<Arc<Session>> {
        match self.state {
            ClientState::Idle | ClientState::Closed => {}
            ClientState::Connected => return Err(SessionError::AlreadyConnected),
            other => {
                return Err(SessionError::InvalidState {
                    operation: "connect",
                    state: other.to_string(),
                })
            }
        }

        self.state = ClientState::Connecting;
        self.last_attempts = 0;
        let authority = config.authority();

        let addrs = match linechat_transport::resolve(config.host(), config.port()) {
            Ok(addrs) => addrs,
            Err(source) => {
                self.state = ClientState::Idle;
                self.last_attempts = 1;
                return Err(SessionError::ConnectionFailed {
                    authority,
                    attempts: 1,
                    source,
                });
            }
        };

        let mut attempt = 0u32;
        let stream = loop {
            attempt += 1;
            self.last_attempts = attempt;
            debug!(%authority, attempt, "connecting");

            let error = match connect_any(&addrs, policy.connect_timeout()) {
                Ok(stream) => break stream,
                Err(error) => error,
            };

            if !error.is_retryable_connect() || attempt >= policy.max_attempts() {
                self.state = ClientState::Idle;
                warn!(%authority, attempts = attempt, error = %error, "giving up on connect");
                return Err(SessionError::ConnectionFailed {
                    authority,
                    attempts: attempt,
                    source: error,
                });
            }

            self.state = ClientState::Retrying;
            let delay = policy.delay_after(attempt);
            warn!(
                %authority,
                attempt,
                max_attempts = policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "connection failed, trying again"
            );
            if let Some(observer) = self.on_retry.as_mut() {
                observer(&RetryEvent {
                    attempt,
                    max_attempts: policy.max_attempts(),
                    delay,
                    error: &error,
                });
            }
            std::thread::sleep(delay);
            self.state = ClientState::Connecting;
        };

        self.connected += 1;
        let session = Session::establish(
            format!("client-{}", self.connected),
            stream,
            self.frame_config.clone(),
        )
        .inspect_err(|_| self.state = ClientState::Idle)?;
        session.mark_connected();
        info!(%authority, attempts = attempt, "connection successfully made to the server");

        self.session = Some(Arc::clone(&session));
        self.state = ClientState::Connected;
        Ok(session)
    }

    /// Close the session, if any. Idempotent.
    pub fn close(&mut self) {
        if self.state == ClientState::Closed {
            return;
        }
        if let Some(session) = self.session.take() {
            if let Err(err) = session.close() {
                warn!(error = %err, "error closing session");
            }
        }
        self.state = ClientState::Closed;
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Number of attempts made by the most recent [`connect`](Self::connect).
    pub fn last_attempts(&self) -> u32 {
        self.last_attempts
    }

    /// The live session, if connected.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.clone()
    }

    /// A handle that can close the live session from another thread.
    pub fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        self.session.clone().map(ShutdownHandle::new)
    }
}

impl Drop for ClientEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

/// Try each resolved address once; report the last failure.
fn connect_any(
    addrs: &[std::net::SocketAddr],
    timeout: Option<Duration>,
) -> std::result::Result<ChatStream, TransportError> {
    let mut last_err = None;
    for &addr in addrs {
        match ChatStream::connect(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        TransportError::Io(std::io::Error::other("no address to connect to"))
    }))
}
