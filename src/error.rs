use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::ticket::Ticket;

/// Errors raised while creating, starting or supervising a test system.
#[derive(Error, Debug)]
pub enum TestSystemError {
    /// No factory is registered for the descriptor's test system type.
    #[error("unknown test system type: {0}")]
    UnknownTestSystemType(String),

    /// An in-process descriptor names an entry point nobody registered.
    #[error("no in-process entry point registered as '{0}'")]
    UnknownEntryPoint(String),

    #[error("communication socket was not received in time ({}ms)", .0.as_millis())]
    HandshakeTimeout(Duration),

    #[error(
        "external process terminated before a connection could be established (exit status: {})",
        describe_exit(.exit_code)
    )]
    EarlyTermination { exit_code: Option<i32> },

    #[error("failed to launch test engine '{command}': {source}")]
    LaunchFailure {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept engine connection: {0}")]
    AcceptFailure(#[source] io::Error),

    #[error("engine announced ticket {received:?}, expected {expected}")]
    TicketMismatch { expected: Ticket, received: String },

    #[error("test system was killed before a connection was established")]
    Killed,

    #[error("test system has already been started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias using TestSystemError
pub type Result<T> = std::result::Result<T, TestSystemError>;

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}
