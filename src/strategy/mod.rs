//! How a test engine gets launched and who watches over it.
//!
//! [`OutOfProcessStrategy`] spawns a separate process guarded by a timeout
//! watchdog and an early-termination watchdog. [`InProcessStrategy`] runs a
//! registered entry point as a task, with no watchdogs and no way to stop it.

mod in_process;
mod out_of_process;
mod watchdog;

pub use in_process::InProcessStrategy;
pub use out_of_process::OutOfProcessStrategy;
pub use watchdog::Watchdogs;

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::Handshake;
use crate::command_runner::ExecutionLog;
use crate::error::Result;
use crate::ticket::Ticket;

/// Leading flag that puts an in-process engine into fast mode.
pub const FAST_MODE_FLAG: &str = "-x";

/// Where the engine should connect back to, and the ticket it must present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArguments {
    pub host: String,
    pub port: u16,
    pub ticket: Ticket,
}

impl LaunchArguments {
    /// Positional `<host> <port> <ticket>`.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            self.host.clone(),
            self.port.to_string(),
            self.ticket.to_string(),
        ]
    }

    /// `-x <host> <port> <ticket>`, as handed to in-process entry points.
    pub fn to_fast_mode_args(&self) -> Vec<String> {
        let mut args = vec![FAST_MODE_FLAG.to_string()];
        args.extend(self.to_args());
        args
    }

    /// Engine side: recovers the arguments from the trailing positionals,
    /// with or without the fast-mode flag.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Option<Self> {
        let [host, port, ticket] = args.get(args.len().checked_sub(3)?..)? else {
            return None;
        };
        Some(Self {
            host: host.as_ref().to_string(),
            port: port.as_ref().parse().ok()?,
            ticket: Ticket::new(ticket.as_ref().parse().ok()?),
        })
    }
}

/// Launches an engine and supervises it on behalf of a client.
///
/// The handshake guard is the only thing a strategy shares with its client.
#[async_trait]
pub trait CommandRunningStrategy: Send {
    /// Launches the engine. Any watchdogs report through `handshake`.
    async fn start(&mut self, handshake: Arc<Handshake>, launch: LaunchArguments) -> Result<()>;

    /// Waits for the engine to finish and stops watchdogs that are now moot.
    async fn join(&mut self);

    /// Terminates the engine where possible. Idempotent, never fails.
    async fn kill(&mut self);

    fn execution_log(&self) -> ExecutionLog;
}
