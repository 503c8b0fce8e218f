type Result<T> = color_eyre::eyre::Result<T>;

mod cli;

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Command, Config, EngineArgs};
use testsystem_launcher::stub_engine::{self, STUB_ENTRY_POINT};
use testsystem_launcher::{EntryPoints, TestSystemFactoryRegistry, Ticket, TracingListener};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;

    // stdout belongs to the execution log (and to engine output when supervised)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(Config::from_run_args(args)?).await,
        Command::Engine(args) => engine(args).await,
    }
}

/// Start one test system, end its session, and print what happened
async fn run(config: Config) -> Result<()> {
    let mut entry_points = EntryPoints::new();
    entry_points.register(STUB_ENTRY_POINT, stub_engine::entry_point);

    let registry =
        TestSystemFactoryRegistry::new(config.client, entry_points, Arc::new(TracingListener));
    let mut test_system = registry.create(&config.descriptor)?;

    info!("starting test system '{}': {}", test_system.name(), config.descriptor.command_line());
    let outcome = match test_system.start().await {
        Ok(()) => test_system.bye().await,
        Err(e) => Err(e),
    };

    println!("{}", test_system.execution_log());
    outcome?;

    info!("test system '{}' finished", test_system.name());
    Ok(())
}

/// Stub engine: connect back, announce, drain the session
async fn engine(args: EngineArgs) -> Result<()> {
    let received = stub_engine::run(&args.launch_args(), args.ticket_override.map(Ticket::new)).await?;
    info!(received, "stub engine session ended");

    if let Some(code) = args.exit_code {
        std::process::exit(code);
    }
    Ok(())
}
