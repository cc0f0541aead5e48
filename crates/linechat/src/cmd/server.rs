use std::sync::{Arc, Mutex, PoisonError};

use linechat_session::ServerEndpoint;

use crate::cmd::{chat, install_ctrlc_handler, summary_code, ActiveSession, ServerArgs};
use crate::exit::{session_error, CliResult};
use crate::output::{OutputFormat, Role};

pub fn run(args: ServerArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.connection.resolve()?;
    let duplex_config = args.chat.duplex_config()?;

    let mut server = ServerEndpoint::new();
    let local = server
        .bind(&config)
        .map_err(|err| session_error("bind failed", err))?;
    server
        .listen(args.backlog)
        .map_err(|err| session_error("listen failed", err))?;
    tracing::info!(addr = %local, backlog = args.backlog, "server waiting for a connection");

    let active: ActiveSession = Arc::new(Mutex::new(None));
    install_ctrlc_handler(active.clone())?;

    let session = server
        .accept()
        .map_err(|err| session_error("accept failed", err))?;
    *active.lock().unwrap_or_else(PoisonError::into_inner) = server.shutdown_handle();

    let summary = chat(session, duplex_config, Role::Client, format);
    active.lock().unwrap_or_else(PoisonError::into_inner).take();
    server.close();

    summary_code(summary?)
}
