use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{CommandRunningStrategy, LaunchArguments};
use crate::client::Handshake;
use crate::command_runner::{CommandRunner, ExecutionLog};
use crate::entry_points::EntryPoint;
use crate::error::{Result, TestSystemError};

/// Runs the engine's entry point as a task inside this process.
///
/// There are no watchdogs: in-process startup is expected to be fast. The
/// flip side is that `kill()` cannot stop the entry point; it only reaches
/// the no-op stand-in runner.
pub struct InProcessStrategy {
    entry_point_id: String,
    entry_point: EntryPoint,
    runner: CommandRunner,
    task: Option<JoinHandle<()>>,
}

impl InProcessStrategy {
    pub fn new(entry_point_id: impl Into<String>, entry_point: EntryPoint) -> Self {
        let entry_point_id = entry_point_id.into();
        Self {
            runner: CommandRunner::stand_in(&entry_point_id, Vec::new()),
            entry_point_id,
            entry_point,
            task: None,
        }
    }

    /// True while the entry point is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

#[async_trait]
impl CommandRunningStrategy for InProcessStrategy {
    async fn start(&mut self, _handshake: Arc<Handshake>, launch: LaunchArguments) -> Result<()> {
        let args = launch.to_fast_mode_args();
        self.runner = CommandRunner::stand_in(&self.entry_point_id, args.clone());

        let entry_point = Arc::clone(&self.entry_point);
        let id = self.entry_point_id.clone();
        info!(entry_point = %id, "starting in-process test engine");
        self.task = Some(tokio::spawn(async move {
            match entry_point(args).await {
                Ok(()) => debug!(entry_point = %id, "in-process engine finished"),
                Err(e) => error!(entry_point = %id, "in-process engine failed: {:?}", e),
            }
        }));

        self.runner
            .asynchronous_start()
            .await
            .map_err(|source| TestSystemError::LaunchFailure {
                command: self.entry_point_id.clone(),
                source,
            })
    }

    async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(entry_point = %self.entry_point_id, "in-process engine panicked: {}", e);
            }
        }
    }

    async fn kill(&mut self) {
        self.runner.kill().await;
    }

    fn execution_log(&self) -> ExecutionLog {
        self.runner.execution_log()
    }
}
