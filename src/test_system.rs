use std::sync::Arc;

use tracing::warn;

use crate::adapter::{Dialect, ProtocolAdapter};
use crate::client::{ConnectionState, TestSystemClient};
use crate::command_runner::ExecutionLog;
use crate::error::Result;
use crate::listener::TestSystemListener;

/// A ready-to-start engine handle, as produced by the registry.
pub struct TestSystem {
    name: String,
    client: TestSystemClient,
    adapter: Box<dyn ProtocolAdapter>,
    listener: Arc<dyn TestSystemListener>,
}

impl TestSystem {
    pub fn new(
        name: impl Into<String>,
        client: TestSystemClient,
        adapter: Box<dyn ProtocolAdapter>,
        listener: Arc<dyn TestSystemListener>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            adapter,
            listener,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Dialect {
        self.adapter.dialect()
    }

    /// Starts the engine and hands its channel to the protocol adapter.
    pub async fn start(&mut self) -> Result<()> {
        if let Err(error) = self.client.start().await {
            self.listener
                .test_system_stopped(&self.name, &self.client.execution_log(), Some(&error));
            return Err(error);
        }
        if let Some(channel) = self.client.take_channel() {
            self.adapter.attach(channel);
        }
        self.listener.test_system_started(&self.name);
        Ok(())
    }

    /// Ends the session and waits for the engine to finish.
    ///
    /// The engine is joined even if telling it goodbye fails.
    pub async fn bye(&mut self) -> Result<()> {
        let finished = self.adapter.finish().await;
        if let Err(ref e) = finished {
            warn!(test_system = %self.name, "failed to end session cleanly: {}", e);
        }
        self.client.join().await;
        self.listener.test_system_stopped(
            &self.name,
            &self.client.execution_log(),
            finished.as_ref().err(),
        );
        finished
    }

    pub async fn kill(&mut self) {
        self.client.kill().await;
        self.listener
            .test_system_stopped(&self.name, &self.client.execution_log(), None);
    }

    pub fn is_successfully_started(&self) -> bool {
        self.client.is_connection_established()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.connection_state()
    }

    pub fn execution_log(&self) -> ExecutionLog {
        self.client.execution_log()
    }

    /// The protocol layer's view of the engine.
    pub fn adapter_mut(&mut self) -> &mut dyn ProtocolAdapter {
        self.adapter.as_mut()
    }

    pub fn client(&self) -> &TestSystemClient {
        &self.client
    }
}
