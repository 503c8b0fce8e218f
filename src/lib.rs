//! Launches test execution engines, hands them a private channel, and
//! supervises them until they finish or fail.
//!
//! A [`TestSystemFactoryRegistry`] turns a [`Descriptor`] into a
//! [`TestSystem`]. Starting it binds a [`SocketAcceptor`] on an ephemeral
//! port, launches the engine through a [`CommandRunningStrategy`], and waits
//! until the engine connects back with the right [`Ticket`] or a watchdog
//! gives up on it.

pub mod acceptor;
pub mod adapter;
pub mod client;
pub mod command_runner;
pub mod config;
pub mod descriptor;
pub mod entry_points;
pub mod environment;
pub mod error;
pub mod listener;
pub mod registry;
pub mod strategy;
pub mod stub_engine;
pub mod test_system;
pub mod ticket;

pub use acceptor::SocketAcceptor;
pub use adapter::{Dialect, FitAdapter, ProtocolAdapter, SlimAdapter};
pub use client::{ConnectionState, Handshake, TestSystemClient};
pub use command_runner::{CommandRunner, ExecutionLog, ProcessExit};
pub use config::ClientConfig;
pub use descriptor::{Descriptor, LaunchMode};
pub use entry_points::{EntryPoint, EntryPoints};
pub use environment::Environment;
pub use error::{Result, TestSystemError};
pub use listener::{TestSystemListener, TracingListener};
pub use registry::{ClientBuilder, DialectFactory, TestSystemFactory, TestSystemFactoryRegistry};
pub use strategy::{
    CommandRunningStrategy, InProcessStrategy, LaunchArguments, OutOfProcessStrategy,
};
pub use test_system::TestSystem;
pub use ticket::Ticket;
