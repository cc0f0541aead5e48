use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use clap::{Args, Subcommand, ValueEnum};
use linechat_config::{
    ConfigResolver, ConfigSource, ConnectionConfig, OverrideSource, TomlFileSource,
    DEFAULT_CONFIG_FILE, DEFAULT_SECTION,
};
use linechat_session::{
    Backoff, DuplexConfig, DuplexLoop, DuplexSummary, ExitPolicy, ReaderExit, Session,
    ShutdownHandle, WriterExit, DEFAULT_BACKLOG,
};

use crate::exit::{config_error, frame_error, io_error, session_error, CliError, CliResult};
use crate::exit::{FAILURE, INTERNAL, INTERRUPTED, SUCCESS};
use crate::output::{print_message, OutputFormat, Role};

pub mod client;
pub mod server;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for one client and chat with it.
    Server(ServerArgs),
    /// Connect to a server and chat with it.
    Client(ClientArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Server(args) => server::run(args, format),
        Command::Client(args) => client::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Config file with a `[LOCAL_SERVER]` section.
    #[arg(long, value_name = "PATH", env = "LINECHAT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
    /// Section of the config file to read.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_SECTION)]
    pub section: String,
    /// Host to bind or connect to; overrides the config file.
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind or connect to; overrides the config file.
    #[arg(long)]
    pub port: Option<u16>,
}

impl ConnectionArgs {
    /// Resolve host and port. The file is only read when an override is missing.
    pub fn resolve(&self) -> CliResult<ConnectionConfig> {
        let file: Box<dyn ConfigSource> =
            Box::new(TomlFileSource::new(&self.config, self.section.clone()));
        let source = OverrideSource::new(Some(file))
            .with_host(self.host.clone())
            .with_port(self.port);
        let resolver = ConfigResolver::new(source);
        resolver
            .resolve()
            .cloned()
            .map_err(|err| config_error("configuration", err))
    }
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// What to do with the reader once stdin is exhausted.
    #[arg(long, value_enum, default_value = "graceful")]
    pub exit_policy: ExitPolicyArg,
    /// Read timeout used to notice a closed session (e.g. 250ms, 1s).
    #[arg(long, default_value = "250ms")]
    pub read_timeout: String,
    /// With the graceful policy, stop waiting for the peer after this long (e.g. 10s).
    #[arg(long, value_name = "DURATION")]
    pub linger: Option<String>,
}

impl ChatArgs {
    pub fn duplex_config(&self) -> CliResult<DuplexConfig> {
        Ok(DuplexConfig {
            read_timeout: Some(parse_duration(&self.read_timeout)?),
            exit_policy: self.exit_policy.into(),
            linger: self.linger.as_deref().map(parse_duration).transpose()?,
        })
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ExitPolicyArg {
    Graceful,
    Abandon,
}

impl From<ExitPolicyArg> for ExitPolicy {
    fn from(value: ExitPolicyArg) -> Self {
        match value {
            ExitPolicyArg::Graceful => ExitPolicy::Graceful,
            ExitPolicyArg::Abandon => ExitPolicy::Abandon,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum BackoffArg {
    Fixed,
    Exponential,
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(flatten)]
    pub chat: ChatArgs,
    /// Pending-connection queue length (1..=5).
    #[arg(long, default_value_t = DEFAULT_BACKLOG)]
    pub backlog: u32,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(flatten)]
    pub chat: ChatArgs,
    /// Maximum connect attempts.
    #[arg(long, default_value_t = 5)]
    pub attempts: u32,
    /// Seconds to wait between attempts.
    #[arg(long, default_value_t = 1.0)]
    pub delay: f64,
    /// How the delay grows between attempts.
    #[arg(long, value_enum, default_value = "fixed")]
    pub backoff: BackoffArg,
    /// Upper bound for exponential backoff, in seconds.
    #[arg(long, default_value_t = 30.0)]
    pub max_delay: f64,
    /// Per-attempt connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

impl ClientArgs {
    pub fn backoff(&self) -> CliResult<Backoff> {
        Ok(match self.backoff {
            BackoffArg::Fixed => Backoff::Fixed,
            BackoffArg::Exponential => Backoff::Exponential {
                max_delay: std::time::Duration::try_from_secs_f64(self.max_delay).map_err(
                    |_| {
                        CliError::new(
                            crate::exit::USAGE,
                            format!("invalid --max-delay: {}", self.max_delay),
                        )
                    },
                )?,
            },
        })
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// The live session, shared with the interrupt handler.
pub type ActiveSession = Arc<Mutex<Option<ShutdownHandle>>>;

/// Ctrl-C closes the live session (if any) and exits with 130.
pub fn install_ctrlc_handler(active: ActiveSession) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let handle = active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.shutdown() {
                tracing::warn!(error = %err, "error closing session on interrupt");
            }
        }
        tracing::info!("interrupted");
        std::process::exit(INTERRUPTED);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Chat over `session` until stdin runs dry or the peer goes away.
pub fn chat(
    session: Arc<Session>,
    config: DuplexConfig,
    peer: Role,
    format: OutputFormat,
) -> CliResult<DuplexSummary> {
    let session_id = session.id().to_string();
    let duplex = DuplexLoop::new(session, config);
    let stdin = std::io::stdin();
    let mut source = stdin.lock();
    duplex
        .run(&mut source, move |text: String| {
            print_message(&text, peer, &session_id, format)
        })
        .map_err(|err| session_error("chat failed", err))
}

/// Exit code for a finished chat. Peer disconnects are not errors.
pub fn summary_code(summary: DuplexSummary) -> CliResult<i32> {
    match summary.writer_exit {
        WriterExit::EndOfInput => {}
        WriterExit::NotConnected { state, unsent } => {
            return Err(CliError::new(
                FAILURE,
                format!("message not sent, session is {state}: {unsent}"),
            ))
        }
        WriterExit::SendFailed(err) => return Err(session_error("send failed", err)),
        WriterExit::InputFailed(err) => return Err(io_error("reading stdin failed", err)),
    }
    if let Some(report) = summary.reader {
        if let ReaderExit::Failed(err) = report.exit {
            return Err(frame_error("receive failed", err));
        }
    }
    Ok(SUCCESS)
}

/// Parse `250ms`, `5s`, `2m` or a bare number of seconds.
pub fn parse_duration(value: &str) -> CliResult<std::time::Duration> {
    use std::time::Duration;

    let value = value.trim();
    let invalid = || CliError::new(crate::exit::USAGE, format!("invalid duration '{value}'"));

    let (number, scale) = if let Some(ms) = value.strip_suffix("ms") {
        (ms, 0.001)
    } else if let Some(s) = value.strip_suffix('s') {
        (s, 1.0)
    } else if let Some(m) = value.strip_suffix('m') {
        (m, 60.0)
    } else {
        (value, 1.0)
    };

    let number: f64 = number.trim().parse().map_err(|_| invalid())?;
    Duration::try_from_secs_f64(number * scale).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1.5").unwrap(), Duration::from_millis(1500));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn unsent_message_is_a_failure() {
        let summary = DuplexSummary {
            sent: 2,
            writer_exit: WriterExit::NotConnected {
                state: linechat_session::SessionState::Closing,
                unsent: "are you there?".to_string(),
            },
            reader: None,
        };
        let err = summary_code(summary).expect_err("unsent line should fail");
        assert_eq!(err.code, FAILURE);
        assert!(err.message.contains("are you there?"), "{}", err.message);
        assert!(err.message.contains("closing"), "{}", err.message);
    }

    #[test]
    fn clean_end_of_input_succeeds() {
        let summary = DuplexSummary {
            sent: 1,
            writer_exit: WriterExit::EndOfInput,
            reader: None,
        };
        assert_eq!(summary_code(summary).unwrap(), SUCCESS);
    }

    #[test]
    fn linger_is_parsed_when_given() {
        let args = ChatArgs {
            exit_policy: ExitPolicyArg::Graceful,
            read_timeout: "250ms".to_string(),
            linger: Some("2s".to_string()),
        };
        let config = args.duplex_config().unwrap();
        assert_eq!(config.linger, Some(Duration::from_secs(2)));
        assert_eq!(config.read_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn overrides_skip_the_config_file() {
        let args = ConnectionArgs {
            config: PathBuf::from("/nonexistent/linechat.toml"),
            section: DEFAULT_SECTION.to_string(),
            host: Some("127.0.0.1".to_string()),
            port: Some(5000),
        };
        let config = args.resolve().expect("overrides should be enough");
        assert_eq!(config.authority(), "127.0.0.1:5000");
    }

    #[test]
    fn missing_config_file_is_invalid_data() {
        let args = ConnectionArgs {
            config: PathBuf::from("/nonexistent/linechat.toml"),
            section: DEFAULT_SECTION.to_string(),
            host: None,
            port: Some(5000),
        };
        let err = args.resolve().expect_err("host is missing");
        assert_eq!(err.code, crate::exit::DATA_INVALID);
    }
}
