use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{CommandRunningStrategy, LaunchArguments, Watchdogs};
use crate::client::Handshake;
use crate::command_runner::{CommandRunner, ExecutionLog};
use crate::config::ClientConfig;
use crate::environment::Environment;
use crate::error::{Result, TestSystemError};

/// Runs the engine as a separate OS process.
///
/// The engine gets `<host> <port> <ticket>` appended to its configured
/// arguments. Once it is running, a timeout watchdog and an early-termination
/// watchdog race the acceptor for the handshake outcome.
pub struct OutOfProcessStrategy {
    command: String,
    args: Vec<String>,
    environment: Environment,
    working_directory: Option<PathBuf>,
    config: ClientConfig,
    runner: Option<CommandRunner>,
    watchdogs: Option<Watchdogs>,
}

impl OutOfProcessStrategy {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        environment: Environment,
        config: ClientConfig,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            environment,
            working_directory: None,
            config,
            runner: None,
            watchdogs: None,
        }
    }

    pub fn with_working_directory(mut self, dir: Option<PathBuf>) -> Self {
        self.working_directory = dir;
        self
    }

    fn make_command_runner(&self, launch: &LaunchArguments) -> CommandRunner {
        let mut args = self.args.clone();
        args.extend(launch.to_args());
        CommandRunner::new(&self.command, args, self.environment.clone())
            .with_working_directory(self.working_directory.clone())
            .with_kill_grace(self.config.kill_grace)
    }

    async fn cancel_watchdogs(&mut self) {
        if let Some(mut watchdogs) = self.watchdogs.take() {
            watchdogs.cancel().await;
            debug!("watchdogs cancelled");
        }
    }
}

#[async_trait]
impl CommandRunningStrategy for OutOfProcessStrategy {
    async fn start(&mut self, handshake: Arc<Handshake>, launch: LaunchArguments) -> Result<()> {
        let mut runner = self.make_command_runner(&launch);
        let started = runner.asynchronous_start().await;
        let command = runner.command_line();
        // Keep the runner even on failure so the execution log names the command.
        self.runner = Some(runner);
        started.map_err(|source| TestSystemError::LaunchFailure { command, source })?;

        let exit_rx = self
            .runner
            .as_ref()
            .and_then(CommandRunner::exit_watch)
            .ok_or_else(|| TestSystemError::LaunchFailure {
                command: self.command.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "engine process has no supervisor",
                ),
            })?;

        self.watchdogs = Some(Watchdogs::spawn(
            handshake,
            self.config.handshake_timeout,
            self.config.early_termination_debounce,
            exit_rx,
        ));
        info!(
            timeout = ?self.config.handshake_timeout,
            debounce = ?self.config.early_termination_debounce,
            "watchdogs armed"
        );
        Ok(())
    }

    async fn join(&mut self) {
        if let Some(runner) = self.runner.as_mut() {
            runner.join().await;
        }
        self.cancel_watchdogs().await;
    }

    async fn kill(&mut self) {
        // Watchdogs go first so our own kill is never reported as an early exit.
        self.cancel_watchdogs().await;
        if let Some(runner) = self.runner.as_mut() {
            runner.kill().await;
        }
    }

    fn execution_log(&self) -> ExecutionLog {
        match &self.runner {
            Some(runner) => runner.execution_log(),
            None => ExecutionLog {
                command: std::iter::once(self.command.as_str())
                    .chain(self.args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" "),
                ..Default::default()
            },
        }
    }
}
