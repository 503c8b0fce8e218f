use clap::{Args, Parser, Subcommand};
use eyre::eyre;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use testsystem_launcher::environment::Assignment;
use testsystem_launcher::{ClientConfig, Descriptor, Environment, LaunchMode};

type Result<T> = color_eyre::eyre::Result<T>;

/// Launch and supervise a single acceptance-test engine
#[derive(Parser)]
#[command(name = "tslaunch")]
#[command(about = "Launch and supervise a single acceptance-test engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a test system, end its session and print its execution log
    Run(RunArgs),
    /// Act as a stub engine: connect back, announce the ticket, drain the session
    Engine(EngineArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Test system type (fit, slim, or a custom registration)
    #[arg(long = "type", default_value = "slim")]
    pub test_system_type: String,

    /// Display name of the test system
    #[arg(long, default_value = "tslaunch")]
    pub name: String,

    /// Run the engine in-process; COMMAND names the entry point
    #[arg(long)]
    pub in_process: bool,

    /// Handshake timeout (ms)
    #[arg(long, default_value = "60000")]
    pub timeout_ms: u64,

    /// Delay before watching for an early engine exit (ms)
    #[arg(long, default_value = "1000")]
    pub debounce_ms: u64,

    /// Address to accept the engine connection on
    #[arg(long, default_value = "127.0.0.1")]
    pub bind_addr: String,

    /// Extra environment for the engine, as KEY=VALUE (repeatable)
    #[arg(long = "env")]
    pub env: Vec<Assignment>,

    /// Working directory for the engine
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Engine command, or entry point with --in-process
    pub command: String,

    /// Arguments for the engine command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args)]
pub struct EngineArgs {
    /// Fast (in-process) mode flag, accepted for compatibility
    #[arg(short = 'x')]
    pub fast_mode: bool,

    /// Announce this ticket instead of the one we were given
    #[arg(long)]
    pub ticket_override: Option<u32>,

    /// Exit with this status once the session ends
    #[arg(long)]
    pub exit_code: Option<i32>,

    pub host: String,
    pub port: u16,
    pub ticket: u32,
}

impl EngineArgs {
    /// Positional launch arguments, as an engine receives them.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if self.fast_mode {
            args.push("-x".to_string());
        }
        args.push(self.host.clone());
        args.push(self.port.to_string());
        args.push(self.ticket.to_string());
        args
    }
}

/// What `tslaunch run` should launch, and how
#[derive(Debug, Clone)]
pub struct Config {
    pub descriptor: Descriptor,
    pub client: ClientConfig,
}

impl Config {
    /// Parse run arguments into configuration
    pub fn from_run_args(args: RunArgs) -> Result<Self> {
        let bind_address: IpAddr = args
            .bind_addr
            .parse()
            .map_err(|e| eyre!("Invalid bind address '{}': {}", args.bind_addr, e))?;

        let client = ClientConfig::default()
            .with_bind_address(bind_address)
            .with_handshake_timeout(Duration::from_millis(args.timeout_ms))
            .with_early_termination_debounce(Duration::from_millis(args.debounce_ms));

        let launch_mode = if args.in_process {
            LaunchMode::InProcess
        } else {
            LaunchMode::OutOfProcess
        };

        let environment: Environment = args.env.into_iter().collect();
        let mut descriptor = Descriptor::new(args.test_system_type, args.name)
            .with_command(args.command, args.args)
            .with_environment(environment)
            .with_launch_mode(launch_mode);
        descriptor.working_directory = args.cwd;

        Ok(Config { descriptor, client })
    }
}
