use std::fmt;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::environment::Environment;

/// Upper bound on captured stdout/stderr, per stream.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// How long to keep draining pipes after the process exits. Grandchildren
/// holding the pipe open must not stall the exit report.
const IO_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit of a supervised process, with everything it printed.
#[derive(Debug, Clone)]
pub struct ProcessExit {
    /// `None` if waiting on the process failed
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub finished_at: DateTime<Utc>,
    /// False while stdout/stderr are still being drained
    pub output_complete: bool,
}

impl ProcessExit {
    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    pub fn signal(&self) -> Option<i32> {
        self.status.and_then(|s| s.signal())
    }
}

/// Diagnostics for one engine launch: what ran, what it printed, how it ended.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    pub command: String,
    pub pid: Option<u32>,
    /// True for the in-process stand-in, which never has an exit status
    pub in_process: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionLog {
    pub fn has_exited(&self) -> bool {
        self.finished_at.is_some()
    }
}

impl fmt::Display for ExecutionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "command: {}", self.command)?;
        if let Some(pid) = self.pid {
            writeln!(f, "pid: {}", pid)?;
        }
        match (self.exit_code, self.exit_signal) {
            (Some(code), _) => writeln!(f, "exit code: {}", code)?,
            (None, Some(signal)) => writeln!(f, "killed by signal: {}", signal)?,
            _ if self.in_process => writeln!(f, "exit code: n/a (in-process)")?,
            _ => writeln!(f, "exit code: (still running)")?,
        }
        if !self.stdout.is_empty() {
            writeln!(f, "--- stdout ---\n{}", self.stdout.trim_end())?;
        }
        if !self.stderr.is_empty() {
            writeln!(f, "--- stderr ---\n{}", self.stderr.trim_end())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunnerKind {
    Process,
    /// Placeholder for in-process engines; start/join/kill do nothing
    StandIn,
}

/// Spawns and supervises one engine process.
///
/// The child runs in its own process group with stdout and stderr captured.
/// A reaper task owns the child, waits for it (or kills the whole group on
/// request), and publishes a [`ProcessExit`] through a watch channel.
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    environment: Environment,
    working_directory: Option<PathBuf>,
    kind: RunnerKind,
    kill_grace: Duration,
    pid: Option<Pid>,
    started_at: Option<DateTime<Utc>>,
    kill_token: CancellationToken,
    exit_rx: Option<watch::Receiver<Option<ProcessExit>>>,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>, environment: Environment) -> Self {
        Self {
            program: program.into(),
            args,
            environment,
            working_directory: None,
            kind: RunnerKind::Process,
            kill_grace: Duration::from_secs(5),
            pid: None,
            started_at: None,
            kill_token: CancellationToken::new(),
            exit_rx: None,
        }
    }

    /// A runner that stands in for an in-process engine.
    pub fn stand_in(entry_point: impl Into<String>, args: Vec<String>) -> Self {
        let mut runner = Self::new(entry_point, args, Environment::new());
        runner.kind = RunnerKind::StandIn;
        runner
    }

    pub fn with_working_directory(mut self, dir: Option<PathBuf>) -> Self {
        self.working_directory = dir;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_stand_in(&self) -> bool {
        self.kind == RunnerKind::StandIn
    }

    /// Spawns the process and returns once it is running.
    pub async fn asynchronous_start(&mut self) -> io::Result<()> {
        if self.started_at.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "command runner already started",
            ));
        }
        if self.kind == RunnerKind::StandIn {
            debug!(entry_point = %self.program, "in-process stand-in started");
            self.started_at = Some(Utc::now());
            return Ok(());
        }

        info!("Spawning test engine: {}", self.command_line());

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.environment.iter());

        // Own process group so kill() reaches anything the engine forks
        command.process_group(0);
        command.kill_on_drop(true);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        if let Some(ref work_dir) = self.working_directory {
            command.current_dir(work_dir);
        }

        let mut child = command.spawn()?;
        let pid = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(Pid::from_raw);

        let stdout = child.stdout.take().map(|s| tokio::spawn(capture(s)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(capture(s)));

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(supervise(
            child,
            pid,
            stdout,
            stderr,
            self.kill_token.clone(),
            exit_tx,
        ));

        self.pid = pid;
        self.started_at = Some(Utc::now());
        self.exit_rx = Some(exit_rx);

        info!(pid = ?pid.map(Pid::as_raw), "test engine spawned");
        Ok(())
    }

    /// Subscribes to the process exit. `None` for a stand-in or before start.
    pub fn exit_watch(&self) -> Option<watch::Receiver<Option<ProcessExit>>> {
        self.exit_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        match &self.exit_rx {
            Some(rx) => rx.borrow().is_none(),
            None => false,
        }
    }

    /// Waits for the process to exit and its output to be drained. Returns
    /// immediately for a stand-in.
    pub async fn join(&mut self) -> Option<ProcessExit> {
        let mut rx = self.exit_rx.clone()?;
        let drained = |exit: &Option<ProcessExit>| exit.as_ref().is_some_and(|e| e.output_complete);
        let exit = match rx.wait_for(drained).await {
            Ok(exit) => exit.clone(),
            Err(_) => {
                error!("process supervisor went away without reporting an exit");
                None
            }
        };
        exit
    }

    /// Kills the process group and waits, bounded, for the exit to be reaped.
    ///
    /// The group is signalled even when the leader has already exited, so
    /// nothing it left in the background survives. Idempotent. On a stand-in
    /// this does nothing.
    pub async fn kill(&mut self) {
        if self.kind == RunnerKind::StandIn {
            debug!(entry_point = %self.program, "kill on in-process stand-in has no effect");
            return;
        }
        let Some(pid) = self.pid else {
            return;
        };

        self.kill_token.cancel();
        kill_group(pid);
        if timeout(self.kill_grace, self.join()).await.is_err() {
            warn!(pid = ?self.pid.map(Pid::as_raw), "process did not exit within {:?} of being killed", self.kill_grace);
        }
    }

    pub fn execution_log(&self) -> ExecutionLog {
        let exit = self
            .exit_rx
            .as_ref()
            .and_then(|rx| rx.borrow().clone());

        ExecutionLog {
            command: self.command_line(),
            pid: self.pid.and_then(|p| u32::try_from(p.as_raw()).ok()),
            in_process: self.kind == RunnerKind::StandIn,
            started_at: self.started_at,
            finished_at: exit.as_ref().map(|e| e.finished_at),
            exit_code: exit.as_ref().and_then(ProcessExit::code),
            exit_signal: exit.as_ref().and_then(ProcessExit::signal),
            stdout: exit.as_ref().map(|e| e.stdout.clone()).unwrap_or_default(),
            stderr: exit.map(|e| e.stderr).unwrap_or_default(),
        }
    }
}

impl Drop for CommandRunner {
    fn drop(&mut self) {
        // The reaper kills the group once it sees the token.
        self.kill_token.cancel();
    }
}

async fn supervise(
    mut child: Child,
    pid: Option<Pid>,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
    kill_token: CancellationToken,
    exit_tx: watch::Sender<Option<ProcessExit>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_token.cancelled() => {
            if let Some(pid) = pid {
                kill_group(pid);
            }
            if let Err(e) = child.start_kill() {
                debug!("start_kill after SIGKILL: {}", e);
            }
            child.wait().await
        }
    };

    let status = match status {
        Ok(status) => {
            info!("Process exited with status: {:?}", status);
            Some(status)
        }
        Err(e) => {
            error!("Error waiting for process: {}", e);
            None
        }
    };

    // Published before draining: background members of the group may hold
    // the pipes open long after the leader is gone.
    let finished_at = Utc::now();
    exit_tx.send_replace(Some(ProcessExit {
        status,
        stdout: String::new(),
        stderr: String::new(),
        finished_at,
        output_complete: false,
    }));

    let drain = async { (collect(stdout).await, collect(stderr).await) };
    tokio::pin!(drain);
    let (stdout, stderr) = tokio::select! {
        output = &mut drain => output,
        _ = kill_token.cancelled() => {
            if let Some(pid) = pid {
                kill_group(pid);
            }
            drain.await
        }
    };

    exit_tx.send_replace(Some(ProcessExit {
        status,
        stdout,
        stderr,
        finished_at,
        output_complete: true,
    }));
}

/// SIGKILL to the whole process group. A group that is already gone is fine.
fn kill_group(pid: Pid) {
    debug!("Sending SIGKILL to process group {}", pid);
    match killpg(pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send SIGKILL to process group {}: {}", pid, e),
    }
}

async fn collect(reader: Option<JoinHandle<String>>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    match timeout(IO_CAPTURE_TIMEOUT, &mut reader).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("output capture task failed: {}", e);
            String::new()
        }
        Err(_) => {
            warn!("output still open {:?} after exit, giving up", IO_CAPTURE_TIMEOUT);
            reader.abort();
            String::new()
        }
    }
}

/// Reads a pipe to EOF, keeping at most MAX_OUTPUT_BYTES.
async fn capture<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = MAX_OUTPUT_BYTES.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!("output pipe read failed: {}", e);
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
