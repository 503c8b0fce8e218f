//! The client side of the handshake: launch an engine, wait for it to connect
//! back with the right ticket, and supervise it until it is done.

mod handshake;

pub use handshake::{ConnectionState, Handshake};

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::acceptor::SocketAcceptor;
use crate::command_runner::ExecutionLog;
use crate::config::ClientConfig;
use crate::error::{Result, TestSystemError};
use crate::strategy::{CommandRunningStrategy, LaunchArguments};
use crate::ticket::Ticket;

/// Orchestrates one engine: owns the acceptor and the launch strategy and
/// runs the handshake state machine between them.
pub struct TestSystemClient {
    config: ClientConfig,
    ticket: Ticket,
    strategy: Box<dyn CommandRunningStrategy>,
    handshake: Arc<Handshake>,
    acceptor: Option<SocketAcceptor>,
}

impl TestSystemClient {
    pub fn new(strategy: Box<dyn CommandRunningStrategy>, config: ClientConfig) -> Self {
        Self {
            config,
            ticket: Ticket::generate(),
            strategy,
            handshake: Arc::new(Handshake::new()),
            acceptor: None,
        }
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// The acceptor's port, once `start()` has bound it.
    pub fn port(&self) -> Option<u16> {
        self.acceptor.as_ref().and_then(SocketAcceptor::port)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.handshake.state()
    }

    pub fn is_connection_established(&self) -> bool {
        self.handshake.is_connection_established()
    }

    /// Hands the accepted channel to the protocol layer. Yields it once.
    pub fn take_channel(&self) -> Option<TcpStream> {
        self.handshake.take_channel()
    }

    pub fn execution_log(&self) -> ExecutionLog {
        self.strategy.execution_log()
    }

    /// Launches the engine and waits until it connects with the right ticket
    /// or a watchdog gives up on it.
    ///
    /// On failure the engine is killed and the acceptor closed before the
    /// error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if self.handshake.state() != ConnectionState::NotStarted {
            return Err(TestSystemError::AlreadyStarted);
        }
        self.handshake.listening();

        let result = match self.launch().await {
            Ok(()) => self.wait_for_connection().await,
            Err(e) => Err(e),
        };

        if let Err(ref error) = result {
            // A failed start always ends decided, never still listening.
            self.handshake.abandon();
            warn!(%error, state = %self.handshake.state(), "test system failed to start");
            self.strategy.kill().await;
            self.close_acceptor().await;
        }
        result
    }

    async fn launch(&mut self) -> Result<()> {
        let mut acceptor = SocketAcceptor::new(self.config.bind_address);
        let port = acceptor.start(
            Arc::clone(&self.handshake),
            self.ticket,
            self.config.ticket_read_timeout,
        );
        self.acceptor = Some(acceptor);
        let port = port?;

        let launch = LaunchArguments {
            host: self.config.advertised_host.clone(),
            port,
            ticket: self.ticket,
        };
        info!(port, ticket = %self.ticket, "launching test engine");
        self.strategy
            .start(Arc::clone(&self.handshake), launch)
            .await
    }

    /// Polls rather than blocking on one signal: the acceptor and both
    /// watchdogs can each decide the outcome independently.
    async fn wait_for_connection(&self) -> Result<()> {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(outcome) = self.handshake.outcome() {
                return outcome;
            }
        }
    }

    /// Waits for the engine to finish, then tears everything down.
    ///
    /// Cleanup failures are logged and never override the run's outcome.
    pub async fn join(&mut self) {
        self.strategy.join().await;
        self.strategy.kill().await;
        self.close_acceptor().await;
        debug!(state = %self.handshake.state(), "test system joined");
    }

    /// Terminates the engine where the strategy allows it. Safe at any point
    /// and on repeated calls.
    pub async fn kill(&mut self) {
        self.handshake.kill();
        self.strategy.kill().await;
        self.close_acceptor().await;
    }

    async fn close_acceptor(&mut self) {
        if let Some(mut acceptor) = self.acceptor.take() {
            if let Err(e) = acceptor.close().await {
                warn!("Unable to close test system socket acceptor: {}", e);
            }
        }
    }
}
