use tracing::{info, warn};

use crate::command_runner::ExecutionLog;
use crate::error::TestSystemError;

/// Reporting sink told when a test system comes up and goes away.
pub trait TestSystemListener: Send + Sync {
    fn test_system_started(&self, name: &str);

    /// `cause` is set when the test system failed rather than finished.
    fn test_system_stopped(&self, name: &str, log: &ExecutionLog, cause: Option<&TestSystemError>);
}

/// Reports lifecycle events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl TestSystemListener for TracingListener {
    fn test_system_started(&self, name: &str) {
        info!(test_system = name, "test system started");
    }

    fn test_system_stopped(&self, name: &str, log: &ExecutionLog, cause: Option<&TestSystemError>) {
        match cause {
            None => info!(
                test_system = name,
                exit_code = ?log.exit_code,
                "test system stopped"
            ),
            Some(error) => warn!(
                test_system = name,
                exit_code = ?log.exit_code,
                stderr = %log.stderr.trim_end(),
                "test system stopped: {}", error
            ),
        }
    }
}
