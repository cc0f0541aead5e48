use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `Message from <peer>: <text>`
    Pretty,
    /// The message text only.
    Raw,
    /// One JSON object per message.
    Json,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Raw
        }
    }
}

/// Which end of the conversation a message came from.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    from: Role,
    session: &'a str,
    size: usize,
    text: &'a str,
    timestamp: String,
}

pub fn render_message(text: &str, from: Role, session: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Pretty => format!("Message from {}: {text}", from.as_str()),
        OutputFormat::Raw => text.to_string(),
        OutputFormat::Json => {
            let out = MessageOutput {
                from,
                session,
                size: text.len(),
                text,
                timestamp: now_unix_seconds(),
            };
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

pub fn print_message(text: &str, from: Role, session: &str, format: OutputFormat) {
    let line = render_message(text, from, session, format);
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
