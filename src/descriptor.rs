use std::path::PathBuf;

use crate::environment::Environment;

/// Suffix appended to a test system type to select its in-process factory.
pub const IN_PROCESS_SUFFIX: &str = "^inprocess";

/// How the test engine is brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// A separate OS process, supervised by watchdogs
    #[default]
    OutOfProcess,
    /// A background task inside this process; fast, but never force-stopped
    InProcess,
}

/// Everything needed to launch one test system.
///
/// Produced by configuration and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    /// Base type identifier, e.g. `slim` or `fit`
    pub test_system_type: String,
    /// Display name used in logs and reports
    pub name: String,
    /// Program to execute (out-of-process)
    pub command: String,
    /// Arguments placed before the launch arguments
    pub args: Vec<String>,
    /// In-process entry point identifier; falls back to `command`
    pub entry_point: Option<String>,
    /// Variables overlaid on the inherited environment
    pub environment: Environment,
    /// Working directory for the engine process
    pub working_directory: Option<PathBuf>,
    pub launch_mode: LaunchMode,
}

impl Descriptor {
    pub fn new(test_system_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            test_system_type: test_system_type.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_command<I, S>(mut self, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into();
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_launch_mode(mut self, launch_mode: LaunchMode) -> Self {
        self.launch_mode = launch_mode;
        self
    }

    /// The registry key for this descriptor, lower-cased.
    pub fn test_system_type(&self) -> String {
        let base = self.test_system_type.to_lowercase();
        match self.launch_mode {
            LaunchMode::InProcess if !base.ends_with(IN_PROCESS_SUFFIX) => {
                format!("{}{}", base, IN_PROCESS_SUFFIX)
            }
            _ => base,
        }
    }

    /// Identifier of the in-process entry point to run.
    pub fn entry_point_id(&self) -> &str {
        self.entry_point.as_deref().unwrap_or(&self.command)
    }

    /// The full command line, for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
