//! A minimal engine: connects back, announces its ticket and drains the
//! session until the client ends it. Useful as an in-process entry point and
//! behind `tslaunch engine`.

use eyre::{eyre, WrapErr};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::strategy::LaunchArguments;
use crate::ticket::{self, Ticket};

/// Identifier under which the stub is usually registered as an entry point.
pub const STUB_ENTRY_POINT: &str = "stub";

/// Runs the stub engine with `[-x] <host> <port> <ticket>`.
///
/// `ticket_override` makes it announce a different ticket than it was given.
/// Returns the number of session bytes received.
pub async fn run(args: &[String], ticket_override: Option<Ticket>) -> eyre::Result<usize> {
    let launch = LaunchArguments::parse(args)
        .ok_or_else(|| eyre!("expected [-x] <host> <port> <ticket>, got {:?}", args))?;
    let ticket = ticket_override.unwrap_or(launch.ticket);

    let mut channel = ticket::announce(&launch.host, launch.port, ticket)
        .await
        .wrap_err_with(|| format!("connecting to {}:{}", launch.host, launch.port))?;
    info!(host = %launch.host, port = launch.port, %ticket, "stub engine connected");

    let mut session = Vec::new();
    channel
        .read_to_end(&mut session)
        .await
        .wrap_err("reading session")?;
    debug!(bytes = session.len(), "session ended by client");
    Ok(session.len())
}

/// [`run`] shaped as an in-process entry point.
pub async fn entry_point(args: Vec<String>) -> eyre::Result<()> {
    run(&args, None).await.map(|_| ())
}
