use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{ConnectionState, Handshake};
use crate::command_runner::ProcessExit;
use crate::error::TestSystemError;

/// The two watchdogs guarding an out-of-process handshake.
///
/// Both check their cancellation token at every wait point and drop their
/// pending transition once cancelled.
pub struct Watchdogs {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Watchdogs {
    pub fn spawn(
        handshake: Arc<Handshake>,
        handshake_timeout: Duration,
        debounce: Duration,
        exit_rx: watch::Receiver<Option<ProcessExit>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(timeout_watchdog(
                Arc::clone(&handshake),
                handshake_timeout,
                cancel.clone(),
            )),
            tokio::spawn(early_termination_watchdog(
                handshake,
                debounce,
                exit_rx,
                cancel.clone(),
            )),
        ];
        Self { cancel, tasks }
    }

    /// Cancels both watchdogs and waits for them to wind down.
    pub async fn cancel(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("watchdog task failed: {}", e);
            }
        }
    }
}

impl Drop for Watchdogs {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn timeout_watchdog(handshake: Arc<Handshake>, budget: Duration, cancel: CancellationToken) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("timeout watchdog cancelled");
            return;
        }
        _ = sleep(budget) => {}
    }
    if cancel.is_cancelled() {
        return;
    }

    if handshake.fail(
        ConnectionState::TimedOut,
        TestSystemError::HandshakeTimeout(budget),
    ) {
        warn!(?budget, "communication socket was not received in time");
    }
}

async fn early_termination_watchdog(
    handshake: Arc<Handshake>,
    debounce: Duration,
    mut exit_rx: watch::Receiver<Option<ProcessExit>>,
    cancel: CancellationToken,
) {
    // Near-instant exits are not reliably observed without this pause.
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        _ = sleep(debounce) => {}
    }

    let exit_code = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("early termination watchdog cancelled");
            return;
        }
        exit_code = wait_for_exit(&mut exit_rx) => exit_code,
    };
    if cancel.is_cancelled() {
        return;
    }

    if handshake.fail(
        ConnectionState::TerminatedEarly,
        TestSystemError::EarlyTermination { exit_code },
    ) {
        warn!(?exit_code, "test engine terminated before a connection was established");
    }
}

/// Exit code of the process once it has exited; `None` if it was signalled
/// or its supervisor went away.
async fn wait_for_exit(exit_rx: &mut watch::Receiver<Option<ProcessExit>>) -> Option<i32> {
    let exit = exit_rx.wait_for(Option::is_some).await.ok()?;
    exit.as_ref().and_then(ProcessExit::code)
}
