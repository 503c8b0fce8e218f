use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{Result, TestSystemError};

/// Where a client stands in bringing up its engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotStarted,
    Listening,
    Connected,
    TimedOut,
    TerminatedEarly,
    Killed,
}

impl ConnectionState {
    /// True while no outcome has been decided yet.
    pub fn is_pending(self) -> bool {
        matches!(self, ConnectionState::NotStarted | ConnectionState::Listening)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::NotStarted => "not started",
            ConnectionState::Listening => "listening",
            ConnectionState::Connected => "connected",
            ConnectionState::TimedOut => "timed out",
            ConnectionState::TerminatedEarly => "terminated early",
            ConnectionState::Killed => "killed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    established: bool,
    failure: Option<TestSystemError>,
    channel: Option<TcpStream>,
}

/// Guarded connection state shared by a client, its acceptor and its
/// strategy's watchdogs.
///
/// Every observe-then-transition sequence runs under the one mutex here, so
/// exactly one of the signalers decides the outcome. The lock is never held
/// across an `.await`.
#[derive(Debug)]
pub struct Handshake {
    inner: Mutex<Inner>,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::NotStarted,
                established: false,
                failure: None,
                channel: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// True once an engine connection has been accepted, even if the client
    /// was killed afterwards.
    pub fn is_connection_established(&self) -> bool {
        self.lock().established
    }

    pub(crate) fn listening(&self) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::NotStarted {
            inner.state = ConnectionState::Listening;
        }
    }

    /// Records an accepted, ticket-checked channel.
    ///
    /// Returns false, leaving the state untouched, when the handshake was
    /// already decided; the caller then drops the channel.
    pub fn accept_socket(&self, channel: TcpStream) -> bool {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Listening {
            warn!(state = %inner.state, "discarding engine connection that arrived too late");
            return false;
        }
        inner.state = ConnectionState::Connected;
        inner.established = true;
        inner.channel = Some(channel);
        info!("test engine connection established");
        true
    }

    /// Moves a pending handshake to the failed state `next` and reports `error`.
    ///
    /// A no-op returning false if another signaler already decided the outcome.
    pub fn fail(&self, next: ConnectionState, error: TestSystemError) -> bool {
        let mut inner = self.lock();
        if !inner.state.is_pending() {
            debug!(state = %inner.state, attempted = %next, "handshake already decided");
            return false;
        }
        inner.state = next;
        Self::report(&mut inner, error);
        true
    }

    /// The single failure-reporting entry point; the first failure wins.
    pub fn exception_occurred(&self, error: TestSystemError) {
        let mut inner = self.lock();
        Self::report(&mut inner, error);
    }

    fn report(inner: &mut Inner, error: TestSystemError) {
        if inner.failure.is_some() {
            debug!(%error, "ignoring failure after the first one");
            return;
        }
        warn!(%error, "test system handshake failed");
        inner.failure = Some(error);
    }

    /// Marks a pending handshake as given up, as if its budget had expired.
    pub(crate) fn abandon(&self) {
        let mut inner = self.lock();
        if inner.state.is_pending() {
            inner.state = ConnectionState::TimedOut;
        }
    }

    pub(crate) fn kill(&self) {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Killed {
            debug!(previous = %inner.state, "marking test system as killed");
            inner.state = ConnectionState::Killed;
        }
    }

    /// The decided outcome, if any. A recorded failure is handed out once.
    pub(crate) fn outcome(&self) -> Option<Result<()>> {
        let mut inner = self.lock();
        if let Some(error) = inner.failure.take() {
            return Some(Err(error));
        }
        match inner.state {
            ConnectionState::Connected => Some(Ok(())),
            ConnectionState::Killed => Some(Err(TestSystemError::Killed)),
            _ => None,
        }
    }

    pub fn take_channel(&self) -> Option<TcpStream> {
        self.lock().channel.take()
    }
}
