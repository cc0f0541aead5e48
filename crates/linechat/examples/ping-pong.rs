//! Server and client in one process: the client says "ping", the server answers "pong".
//!
//! Run with:
//!   cargo run --example ping-pong

use std::io;
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

use linechat::config::ConnectionConfig;
use linechat::session::{
    ClientEndpoint, DuplexConfig, DuplexLoop, LineSource, RetryPolicy, ServerEndpoint,
    DEFAULT_BACKLOG,
};

/// One side of the exchange. Each side keeps its input open until it has
/// heard what it waits for, so neither half-closes while the other still
/// has a line to send.
struct Turn {
    say_first: Option<String>,
    wait_for: Option<String>,
    then_say: Option<String>,
    heard: mpsc::Receiver<String>,
}

impl LineSource for Turn {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.say_first.take() {
            return Ok(Some(line));
        }
        if let Some(expected) = self.wait_for.take() {
            while let Ok(text) = self.heard.recv() {
                if text == expected {
                    break;
                }
            }
        }
        Ok(self.then_say.take())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Borrow a free port from the OS.
    let port = TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let config = ConnectionConfig::new("127.0.0.1", port)?;

    let mut server = ServerEndpoint::new();
    let addr = server.bind(&config)?;
    server.listen(DEFAULT_BACKLOG)?;
    eprintln!("Listening on {addr}");

    let server_side = thread::spawn(move || -> Result<(), linechat::session::SessionError> {
        let session = server.accept()?;
        let (tx, rx) = mpsc::channel();
        let mut turn = Turn {
            say_first: None,
            wait_for: Some("ping".to_string()),
            then_say: Some("pong".to_string()),
            heard: rx,
        };
        let summary =
            DuplexLoop::new(session, DuplexConfig::default()).run(&mut turn, move |text: String| {
                println!("Message from client: {text}");
                let _ = tx.send(text);
            })?;
        eprintln!("server: {}", summary.writer_exit);
        server.close();
        Ok(())
    });

    let mut client = ClientEndpoint::new();
    let session = client.connect(&config, &RetryPolicy::new(3, 0.1)?)?;
    let (tx, rx) = mpsc::channel();
    let mut turn = Turn {
        say_first: Some("ping".to_string()),
        wait_for: Some("pong".to_string()),
        then_say: None,
        heard: rx,
    };
    let summary =
        DuplexLoop::new(session, DuplexConfig::default()).run(&mut turn, move |text: String| {
            println!("Message from server: {text}");
            let _ = tx.send(text);
        })?;
    eprintln!("client: {}", summary.writer_exit);
    client.close();

    server_side
        .join()
        .map_err(|_| "server thread panicked")??;
    Ok(())
}
