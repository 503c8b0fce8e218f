use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::Dialect;
use crate::client::TestSystemClient;
use crate::config::ClientConfig;
use crate::descriptor::{Descriptor, LaunchMode, IN_PROCESS_SUFFIX};
use crate::entry_points::EntryPoints;
use crate::error::{Result, TestSystemError};
use crate::listener::TestSystemListener;
use crate::strategy::{CommandRunningStrategy, InProcessStrategy, OutOfProcessStrategy};
use crate::test_system::TestSystem;

/// Builds a [`TestSystem`] for a descriptor.
pub trait TestSystemFactory: Send + Sync {
    fn create(&self, descriptor: &Descriptor) -> Result<TestSystem>;
}

impl<F> TestSystemFactory for F
where
    F: Fn(&Descriptor) -> Result<TestSystem> + Send + Sync,
{
    fn create(&self, descriptor: &Descriptor) -> Result<TestSystem> {
        self(descriptor)
    }
}

/// Turns a descriptor into a client with the right launch strategy.
///
/// Shared by every built-in factory; the dialect is chosen separately.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    entry_points: EntryPoints,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig, entry_points: EntryPoints) -> Self {
        Self {
            config,
            entry_points,
        }
    }

    pub fn build(&self, descriptor: &Descriptor, launch_mode: LaunchMode) -> Result<TestSystemClient> {
        let strategy: Box<dyn CommandRunningStrategy> = match launch_mode {
            LaunchMode::OutOfProcess => Box::new(
                OutOfProcessStrategy::new(
                    descriptor.command.clone(),
                    descriptor.args.clone(),
                    descriptor.environment.clone(),
                    self.config.clone(),
                )
                .with_working_directory(descriptor.working_directory.clone()),
            ),
            LaunchMode::InProcess => {
                let id = descriptor.entry_point_id();
                Box::new(InProcessStrategy::new(id, self.entry_points.resolve(id)?))
            }
        };
        Ok(TestSystemClient::new(strategy, self.config.clone()))
    }
}

/// Built-in factory: shared client builder plus one dialect's adapter.
pub struct DialectFactory {
    dialect: Dialect,
    launch_mode: LaunchMode,
    builder: ClientBuilder,
    listener: Arc<dyn TestSystemListener>,
}

impl DialectFactory {
    pub fn new(
        dialect: Dialect,
        launch_mode: LaunchMode,
        builder: ClientBuilder,
        listener: Arc<dyn TestSystemListener>,
    ) -> Self {
        Self {
            dialect,
            launch_mode,
            builder,
            listener,
        }
    }

    /// The registry identifier this factory is meant for.
    pub fn identifier(&self) -> String {
        match self.launch_mode {
            LaunchMode::OutOfProcess => self.dialect.identifier().to_string(),
            LaunchMode::InProcess => format!("{}{}", self.dialect.identifier(), IN_PROCESS_SUFFIX),
        }
    }
}

impl TestSystemFactory for DialectFactory {
    fn create(&self, descriptor: &Descriptor) -> Result<TestSystem> {
        let client = self.builder.build(descriptor, self.launch_mode)?;
        Ok(TestSystem::new(
            descriptor.name.clone(),
            client,
            self.dialect.adapter(),
            Arc::clone(&self.listener),
        ))
    }
}

/// Maps test system type identifiers (case-insensitive) to factories.
#[derive(Default)]
pub struct TestSystemFactoryRegistry {
    factories: HashMap<String, Arc<dyn TestSystemFactory>>,
}

impl TestSystemFactoryRegistry {
    /// A registry with `fit`, `fit^inprocess`, `slim` and `slim^inprocess`.
    pub fn new(
        config: ClientConfig,
        entry_points: EntryPoints,
        listener: Arc<dyn TestSystemListener>,
    ) -> Self {
        let builder = ClientBuilder::new(config, entry_points);
        let mut registry = Self::default();
        for dialect in [Dialect::Slim, Dialect::Fit] {
            for launch_mode in [LaunchMode::OutOfProcess, LaunchMode::InProcess] {
                let factory =
                    DialectFactory::new(dialect, launch_mode, builder.clone(), Arc::clone(&listener));
                registry.register(factory.identifier(), factory);
            }
        }
        registry
    }

    /// Registers `factory` for `identifier`, replacing any earlier one.
    pub fn register(&mut self, identifier: impl AsRef<str>, factory: impl TestSystemFactory + 'static) {
        let identifier = identifier.as_ref().to_lowercase();
        debug!(%identifier, "registering test system factory");
        self.factories.insert(identifier, Arc::new(factory));
    }

    pub fn create(&self, descriptor: &Descriptor) -> Result<TestSystem> {
        let identifier = descriptor.test_system_type();
        let factory = self
            .factories
            .get(&identifier)
            .ok_or(TestSystemError::UnknownTestSystemType(identifier))?;
        factory.create(descriptor)
    }

    pub fn is_registered(&self, identifier: &str) -> bool {
        self.factories.contains_key(&identifier.to_lowercase())
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut identifiers: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        identifiers.sort_unstable();
        identifiers
    }
}
