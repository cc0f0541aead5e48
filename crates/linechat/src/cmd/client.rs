use std::sync::{Arc, Mutex, PoisonError};

use linechat_session::{ClientEndpoint, RetryPolicy};

use crate::cmd::{
    chat, install_ctrlc_handler, parse_duration, summary_code, ActiveSession, ClientArgs,
};
use crate::exit::{session_error, CliResult};
use crate::output::{OutputFormat, Role};

pub fn run(args: ClientArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.connection.resolve()?;
    let duplex_config = args.chat.duplex_config()?;
    let policy = RetryPolicy::new(args.attempts, args.delay)
        .map_err(|err| session_error("invalid retry settings", err))?
        .with_backoff(args.backoff()?)
        .with_connect_timeout(Some(parse_duration(&args.connect_timeout)?));

    let active: ActiveSession = Arc::new(Mutex::new(None));
    install_ctrlc_handler(active.clone())?;

    let mut client = ClientEndpoint::new();
    let session = client
        .connect(&config, &policy)
        .map_err(|err| session_error("connect failed", err))?;
    *active.lock().unwrap_or_else(PoisonError::into_inner) = client.shutdown_handle();

    let summary = chat(session, duplex_config, Role::Server, format);
    active.lock().unwrap_or_else(PoisonError::into_inner).take();
    client.close();

    summary_code(summary?)
}
