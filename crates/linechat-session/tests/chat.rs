use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use linechat_config::ConnectionConfig;
use linechat_session::{
    ClientEndpoint, ClientState, DuplexConfig, DuplexLoop, ExitPolicy, LineSource, ReaderExit,
    RetryPolicy, ServerEndpoint, ServerState, SessionError, SessionState, WriterExit,
    DEFAULT_BACKLOG, DEFAULT_READ_TIMEOUT,
};

enum Step {
    Say(String),
    Hear(String),
}

/// A conversation: says its lines in order, and before moving past a `Hear`
/// step blocks until that message has arrived.
struct Script {
    steps: VecDeque<Step>,
    inbox: mpsc::Receiver<String>,
    heard: Vec<String>,
}

impl Script {
    fn new(steps: Vec<Step>) -> (Self, impl FnMut(String) + Send + 'static) {
        let (tx, inbox) = mpsc::channel();
        let script = Self {
            steps: steps.into(),
            inbox,
            heard: Vec::new(),
        };
        (script, move |text: String| {
            let _ = tx.send(text);
        })
    }

    /// Everything received, including messages after the last `Hear`.
    fn into_heard(mut self) -> Vec<String> {
        self.heard.extend(self.inbox.try_iter());
        self.heard
    }
}

impl LineSource for Script {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        while let Some(step) = self.steps.pop_front() {
            match step {
                Step::Say(text) => return Ok(Some(text)),
                Step::Hear(expected) => loop {
                    let text = self
                        .inbox
                        .recv_timeout(Duration::from_secs(10))
                        .map_err(|err| io::Error::new(io::ErrorKind::TimedOut, err))?;
                    let done = text == expected;
                    self.heard.push(text);
                    if done {
                        break;
                    }
                },
            }
        }
        Ok(None)
    }
}

fn say(text: &str) -> Step {
    Step::Say(text.to_string())
}

fn hear(text: &str) -> Step {
    Step::Hear(text.to_string())
}

fn free_port() -> u16 {
    let spare = TcpListener::bind("127.0.0.1:0").expect("spare should bind");
    spare.local_addr().expect("spare socket has an address").port()
}

fn loopback(port: u16) -> ConnectionConfig {
    ConnectionConfig::new("127.0.0.1", port).expect("loopback config should be valid")
}

fn listening_server() -> (ServerEndpoint, ConnectionConfig) {
    let config = loopback(free_port());
    let mut server = ServerEndpoint::new();
    server.bind(&config).expect("server should bind");
    server.listen(DEFAULT_BACKLOG).expect("server should listen");
    (server, config)
}

fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, 0.01)
        .expect("policy should be valid")
        .with_connect_timeout(Some(Duration::from_secs(2)))
}

#[test]
fn ping_pong_reaches_closed_on_both_sides() {
    let (mut server, config) = listening_server();

    let server_side = thread::spawn(move || {
        let session = server.accept().expect("server should accept");
        let (mut script, sink) = Script::new(vec![hear("ping"), say("pong")]);
        let summary = DuplexLoop::new(session, DuplexConfig::default())
            .run(&mut script, sink)
            .expect("server duplex should run");
        server.close();
        (summary, script.into_heard(), server.state())
    });

    let mut client = ClientEndpoint::new();
    let session = client
        .connect(&config, &fast_policy(3))
        .expect("client should connect");
    let (mut script, sink) = Script::new(vec![say("ping"), hear("pong")]);
    let summary = DuplexLoop::new(session.clone(), DuplexConfig::default())
        .run(&mut script, sink)
        .expect("client duplex should run");
    client.close();

    assert_eq!(summary.sent, 1);
    assert!(matches!(summary.writer_exit, WriterExit::EndOfInput));
    assert_eq!(script.into_heard(), vec!["pong"]);
    assert_eq!(client.state(), ClientState::Closed);
    assert_eq!(session.state(), SessionState::Closed);

    let (server_summary, server_received, server_state) =
        server_side.join().expect("server thread should finish");
    assert_eq!(server_summary.sent, 1);
    assert_eq!(server_received, vec!["ping"]);
    assert_eq!(server_state, ServerState::Closed);
}

#[test]
fn many_messages_arrive_in_order() {
    let (mut server, config) = listening_server();
    let count = 500;

    let server_side = thread::spawn(move || {
        let session = server.accept().expect("server should accept");
        let last = format!("message {}", count - 1);
        let (mut script, sink) = Script::new(vec![hear(&last)]);
        let summary = DuplexLoop::new(session, DuplexConfig::default())
            .run(&mut script, sink)
            .expect("server duplex should run");
        let report = summary.reader.expect("graceful run joins the reader");
        assert!(matches!(report.exit, ReaderExit::PeerClosed));
        script.into_heard()
    });

    let mut client = ClientEndpoint::new();
    let session = client
        .connect(&config, &fast_policy(3))
        .expect("client should connect");
    let input: String = (0..count).map(|i| format!("message {i}\n")).collect();
    let summary = DuplexLoop::new(session, DuplexConfig::default())
        .run(&mut Cursor::new(input), |_text: String| {})
        .expect("client duplex should run");
    assert_eq!(summary.sent, count);

    let received = server_side.join().expect("server thread should finish");
    let expected: Vec<String> = (0..count).map(|i| format!("message {i}")).collect();
    assert_eq!(received, expected);
}

#[test]
fn hello_round_trip_and_close_semantics() {
    let (mut server, config) = listening_server();
    let acceptor = thread::spawn(move || {
        let session = server.accept().expect("server should accept");
        (server, session)
    });

    let mut client = ClientEndpoint::new();
    let client_session = client
        .connect(&config, &fast_policy(3))
        .expect("client should connect");
    let (mut server, server_session) = acceptor.join().expect("acceptor should finish");

    let (tx, rx) = mpsc::channel();
    let duplex = DuplexLoop::new(server_session.clone(), DuplexConfig::default());
    let reader = duplex
        .spawn_reader(move |text: String| tx.send(text).expect("receiver alive"))
        .expect("reader should spawn");

    client_session.send("hello").expect("send should succeed");
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).expect("message should arrive"),
        "hello"
    );

    let closed_at = Instant::now();
    server.close();
    let report = reader.join();
    assert!(
        closed_at.elapsed() < DEFAULT_READ_TIMEOUT,
        "reader took {:?} to notice the close",
        closed_at.elapsed()
    );
    assert_eq!(report.delivered, 1);
    assert!(matches!(report.exit, ReaderExit::SessionClosed));

    assert!(matches!(
        server_session.send("late"),
        Err(SessionError::NotConnected {
            state: SessionState::Closed
        })
    ));
    server.close();
    assert_eq!(server.state(), ServerState::Closed);
    assert_eq!(server_session.state(), SessionState::Closed);

    client.close();
    client.close();
    assert_eq!(client_session.state(), SessionState::Closed);
}

#[test]
fn retry_succeeds_once_server_comes_up() {
    let config = loopback(free_port());
    let (server_tx, server_rx) = mpsc::channel::<ServerEndpoint>();
    let server_config = config.clone();

    let acceptor = thread::spawn(move || {
        let mut server = server_rx.recv().expect("server should be handed over");
        let session = server.accept().expect("server should accept");
        (server, session)
    });

    let mut client = ClientEndpoint::new().on_retry(move |event| {
        if event.attempt == 2 {
            let mut server = ServerEndpoint::new();
            server.bind(&server_config).expect("server should bind");
            server.listen(DEFAULT_BACKLOG).expect("server should listen");
            server_tx.send(server).expect("acceptor alive");
        }
    });

    let session = client
        .connect(&config, &fast_policy(3))
        .expect("third attempt should connect");
    assert_eq!(client.last_attempts(), 3);
    assert_eq!(client.state(), ClientState::Connected);
    assert_eq!(session.state(), SessionState::Connected);

    let (mut server, server_session) = acceptor.join().expect("acceptor should finish");
    assert_eq!(server_session.state(), SessionState::Connected);
    server.close();
    client.close();
}

#[test]
fn retry_exhaustion_reports_last_cause() {
    let config = loopback(free_port());
    let mut seen = Vec::new();
    let (tx, rx) = mpsc::channel();
    let mut client = ClientEndpoint::new().on_retry(move |event| {
        tx.send(event.attempt).expect("receiver alive");
    });

    let err = client
        .connect(&config, &fast_policy(3))
        .expect_err("nothing is listening");
    match err {
        SessionError::ConnectionFailed {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(source.is_retryable_connect());
        }
        other => panic!("expected ConnectionFailed, got {other:?}"),
    }
    seen.extend(rx.try_iter());
    assert_eq!(seen, vec![1, 2]);
    assert_eq!(client.state(), ClientState::Idle);
    assert_eq!(client.last_attempts(), 3);
}

#[test]
fn unresolvable_host_fails_without_retrying() {
    let config = ConnectionConfig::new("host.invalid", 5000).expect("config should be valid");
    let mut client = ClientEndpoint::new();

    let err = client
        .connect(&config, &fast_policy(5))
        .expect_err("name should not resolve");
    assert!(matches!(
        err,
        SessionError::ConnectionFailed { attempts: 1, .. }
    ));
}

#[test]
fn abandon_policy_returns_without_joining() {
    let (mut server, config) = listening_server();
    let acceptor = thread::spawn(move || {
        let session = server.accept().expect("server should accept");
        (server, session)
    });

    let mut client = ClientEndpoint::new();
    let session = client
        .connect(&config, &fast_policy(3))
        .expect("client should connect");
    let (mut server, _server_session) = acceptor.join().expect("acceptor should finish");

    let config = DuplexConfig {
        exit_policy: ExitPolicy::Abandon,
        ..DuplexConfig::default()
    };
    let summary = DuplexLoop::new(session.clone(), config)
        .run(&mut Cursor::new("bye\n"), |_text: String| {})
        .expect("duplex should run");

    assert_eq!(summary.sent, 1);
    assert!(summary.reader.is_none());
    assert_eq!(session.state(), SessionState::Connected);

    client.close();
    server.close();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn server_accepts_next_peer_after_release() {
    let (mut server, config) = listening_server();

    let peers = thread::spawn(move || {
        let mut ids = Vec::new();
        for _ in 0..2 {
            let mut client = ClientEndpoint::new();
            let session = client
                .connect(&config, &fast_policy(3))
                .expect("client should connect");
            ids.push(session.id().to_string());
            let summary = DuplexLoop::new(session, DuplexConfig::default())
                .run(&mut Cursor::new(""), |_text: String| {})
                .expect("duplex should run");
            assert!(summary.reader.is_some());
            client.close();
        }
        ids
    });

    let mut server_ids = Vec::new();
    for _ in 0..2 {
        let session = server.accept().expect("server should accept");
        server_ids.push(session.id().to_string());
        let summary = DuplexLoop::new(session, DuplexConfig::default())
            .run(&mut Cursor::new(""), |_text: String| {})
            .expect("duplex should run");
        assert!(summary.reader.is_some());
        server.release_session().expect("release should succeed");
    }
    server.close();

    assert_eq!(server_ids, vec!["server-1", "server-2"]);
    assert_eq!(peers.join().expect("peers should finish"), vec!["client-1", "client-1"]);
}
