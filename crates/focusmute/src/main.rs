//! Binary entrypoint for focusmute.
use std::{path::PathBuf, process};

use clap::{Parser, Subcommand};
use logging::{self as logshared, LogArgs};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, util::TryInitError};

/// Process exit codes.
mod failure;
#[cfg(windows)]
mod run;
/// CLI overrides over the config file.
mod settings;

use crate::{
    failure::{EXIT_OK, Failure},
    settings::Overrides,
};

#[derive(Parser, Debug)]
#[command(
    name = "focusmute",
    about = "Mute every application except the one with focus",
    version
)]
/// Command-line interface for the `focusmute` binary.
struct Cli {
    /// Optional subcommand.
    #[command(subcommand)]
    command: Option<Command>,

    /// Logging controls
    #[command(flatten)]
    log: LogArgs,

    /// Optional path to the config file (defaults to ~/.focusmute/config.ron)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// How long to wait for audio session tracking to start
    #[arg(long, value_name = "MS")]
    ready_timeout_ms: Option<u64>,

    /// Upper bound on the wait for the worker to stop
    #[arg(long, value_name = "MS")]
    join_timeout_ms: Option<u64>,

    /// Leave sessions muted on exit
    #[arg(long)]
    no_restore: bool,
}

#[derive(Subcommand, Debug)]
/// Top-level CLI subcommands.
enum Command {
    /// Load and validate the configuration then exit.
    Check {
        /// Path to configuration file to check
        path: Option<PathBuf>,
    },
}

impl Cli {
    /// Overrides given as flags.
    fn overrides(&self) -> Overrides {
        Overrides {
            ready_timeout_ms: self.ready_timeout_ms,
            join_timeout_ms: self.join_timeout_ms,
            no_restore: self.no_restore,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log) {
        eprintln!("logging disabled: {e}");
    }

    let code = match execute(&cli) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            eprintln!("{}", e.report());
            e.exit_code()
        }
    };
    debug!(code, "exiting");
    process::exit(code);
}

/// Install the global subscriber: the computed filter plus compact output.
fn init_tracing(log: &LogArgs) -> Result<(), TryInitError> {
    let env_filter = logshared::env_filter_from_spec(&log.spec());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().without_time())
        .try_init()
}

/// Dispatch the selected command.
fn execute(cli: &Cli) -> Result<(), Failure> {
    if let Some(Command::Check { path }) = &cli.command {
        let explicit = path.as_deref().or(cli.config.as_deref());
        let cfg = cli.overrides().apply(config::load(explicit)?)?;
        println!("{cfg:#?}");
        return Ok(());
    }

    let cfg = cli.overrides().apply(config::load(cli.config.as_deref())?)?;
    debug!(?cfg, "config_loaded");
    start(&cfg)
}

#[cfg(windows)]
/// Run the focus-driven muting loop.
fn start(cfg: &config::Config) -> Result<(), Failure> {
    run::run(cfg)
}

#[cfg(not(windows))]
/// No audio session backend on this platform.
fn start(_cfg: &config::Config) -> Result<(), Failure> {
    Err(Failure::Unsupported)
}
