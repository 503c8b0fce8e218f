use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::{Result, TestSystemError};

/// An in-process engine: called with `-x <host> <port> <ticket>`.
pub type EntryPoint = Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, eyre::Result<()>> + Send + Sync>;

/// In-process engine entry points, keyed by the identifier a descriptor
/// names in its entry-point (or command) field.
#[derive(Clone, Default)]
pub struct EntryPoints {
    table: HashMap<String, EntryPoint>,
}

impl EntryPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `id`, replacing any previous registration.
    pub fn register<F, Fut>(&mut self, id: impl Into<String>, entry: F)
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.table
            .insert(id.into(), Arc::new(move |args| entry(args).boxed()));
    }

    pub fn resolve(&self, id: &str) -> Result<EntryPoint> {
        self.table
            .get(id)
            .cloned()
            .ok_or_else(|| TestSystemError::UnknownEntryPoint(id.to_string()))
    }
}

impl fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.table.keys()).finish()
    }
}
