use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Handshake;
use crate::error::{Result, TestSystemError};
use crate::ticket::Ticket;

/// Longest ticket announcement we are willing to read.
const MAX_ANNOUNCEMENT_BYTES: usize = 128;

/// Pending connections the kernel may queue before we accept the first one
const LISTEN_BACKLOG: i32 = 8;

/// Listens on an OS-assigned port and accepts exactly one engine connection.
///
/// The accepted connection is ticket-checked and then handed to the
/// client's [`Handshake`]; failures go through its failure entry point.
pub struct SocketAcceptor {
    bind_address: IpAddr,
    local_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SocketAcceptor {
    pub fn new(bind_address: IpAddr) -> Self {
        Self {
            bind_address,
            local_addr: None,
            shutdown: CancellationToken::new(),
            task: None,
        }
    }

    fn bind_listener(&self) -> io::Result<TcpListener> {
        let socket_addr = SocketAddr::new(self.bind_address, 0);

        let socket = Socket::new(
            Domain::for_address(socket_addr),
            Type::STREAM,
            Some(Protocol::TCP),
        )?;
        socket.set_reuse_address(true)?;
        socket.bind(&socket_addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        socket.set_nonblocking(true)?;

        TcpListener::from_std(socket.into())
    }

    /// Binds the listener and spawns the accept task. Returns the bound port.
    pub fn start(
        &mut self,
        handshake: Arc<Handshake>,
        ticket: Ticket,
        read_timeout: Duration,
    ) -> Result<u16> {
        let listener = self.bind_listener()?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        info!(%local_addr, "waiting for test engine connection");

        let shutdown = self.shutdown.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("acceptor closed before an engine connected");
                }
                accepted = accept_one(&listener, ticket, read_timeout) => match accepted {
                    Ok(channel) => {
                        // A false return means a watchdog won; dropping the
                        // channel closes it.
                        handshake.accept_socket(channel);
                    }
                    Err(error) => handshake.exception_occurred(error),
                },
            }
        }));

        Ok(local_addr.port())
    }

    pub fn port(&self) -> Option<u16> {
        self.local_addr.map(|addr| addr.port())
    }

    /// Stops listening. Safe to call whether or not anything connected.
    pub async fn close(&mut self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            debug!(port = ?self.port(), "acceptor closed");
        }
        Ok(())
    }
}

impl Drop for SocketAcceptor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_one(listener: &TcpListener, ticket: Ticket, read_timeout: Duration) -> Result<TcpStream> {
    let (mut stream, peer) = listener
        .accept()
        .await
        .map_err(TestSystemError::AcceptFailure)?;
    debug!(%peer, "engine connected, reading ticket");

    let line = timeout(read_timeout, read_announcement(&mut stream))
        .await
        .map_err(|_| {
            TestSystemError::AcceptFailure(io::Error::new(
                io::ErrorKind::TimedOut,
                "engine did not announce its ticket in time",
            ))
        })?
        .map_err(TestSystemError::AcceptFailure)?;

    match Ticket::parse(&line) {
        Some(announced) if announced == ticket => Ok(stream),
        _ => {
            warn!(%peer, expected = %ticket, received = %line.trim(), "rejecting engine with wrong ticket");
            Err(TestSystemError::TicketMismatch {
                expected: ticket,
                received: line.trim().to_string(),
            })
        }
    }
}

/// Reads up to the first newline one byte at a time, so nothing past the
/// announcement is consumed from the session payload.
async fn read_announcement(stream: &mut TcpStream) -> io::Result<String> {
    let mut line = Vec::with_capacity(16);
    let mut byte = [0u8; 1];
    while line.len() < MAX_ANNOUNCEMENT_BYTES {
        if stream.read(&mut byte).await? == 0 {
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
