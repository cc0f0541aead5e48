use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a full `EnvFilter` directive string. When set
/// and valid it replaces the filter built from `--log-level`.
pub const LOG_ENV: &str = "LINECHAT_LOG";

/// Crates whose events follow `--log-level`. Everything else stays at `warn`.
const CHAT_TARGETS: [&str; 5] = [
    "linechat",
    "linechat_session",
    "linechat_transport",
    "linechat_frame",
    "linechat_config",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Directives for `level`: chat crates at `level`, dependencies at `warn`.
fn default_directives(level: LogLevel) -> String {
    let level = level.as_str();
    let mut directives = String::from("warn");
    for target in CHAT_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

fn chat_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Logs go to stderr so stdout carries only chat messages. Session and peer
/// fields are kept on each event; the module target is dropped in text mode.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(chat_filter(level))
        .with_ansi(false);

    match format {
        LogFormat::Text => {
            let _ = builder.with_target(false).try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().with_current_span(false).try_init();
        }
    }
}
