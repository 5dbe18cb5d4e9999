//! Strata CLI - Command-line interface
//!
//! Resolves URIs through the strata library and inspects, copies or watches
//! the resources they name. Any argument that is not a URI is treated as a
//! local path.

mod commands;
mod error;
mod runner;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use strata::logging::{self, LoggingConfig};

use crate::commands::watch::WatchArgs;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about = "Inspect, copy and watch URI-addressed resources")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Mount a named overlay root, addressable as ovl://NAME/...
    #[arg(long = "mount", global = true, value_name = "NAME=URI")]
    mounts: Vec<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to daily files in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a resource's content
    Cat {
        /// URI or path
        target: String,
    },

    /// List the children of a container
    Ls {
        /// URI or path
        target: String,

        /// Show kind and size
        #[arg(short, long)]
        long: bool,
    },

    /// Show a resource's metadata
    Stat {
        /// URI or path
        target: String,
    },

    /// Copy one resource to another
    Cp {
        /// Source URI or path
        source: String,

        /// Destination URI or path
        destination: String,
    },

    /// Report changes to a resource until interrupted
    Watch {
        /// URI or path
        target: String,

        /// Poll interval in milliseconds (defaults to [watcher] poll_interval_ms)
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Cat { .. } => "cat",
            Commands::Ls { .. } => "ls",
            Commands::Stat { .. } => "stat",
            Commands::Cp { .. } => "cp",
            Commands::Watch { .. } => "watch",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging_config = LoggingConfig::default().with_verbose(cli.verbose);
    if let Some(dir) = &cli.log_dir {
        logging_config = logging_config.with_log_dir(dir);
    }
    let _logging = match logging::init(&logging_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: {}", e);
            None
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let runner = CliRunner::new(cli.config.as_deref(), &cli.mounts)?;
    runner.log_startup(cli.command.name());
    let _context = runner.enter();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Cat { target } => commands::cat::run(&runner, &target, &mut out),
        Commands::Ls { target, long } => commands::ls::run(&runner, &target, long, &mut out),
        Commands::Stat { target } => commands::stat::run(&runner, &target, &mut out),
        Commands::Cp {
            source,
            destination,
        } => commands::cp::run(&runner, &source, &destination, &mut out),
        Commands::Watch {
            target,
            interval_ms,
        } => commands::watch::run(&runner, WatchArgs { target, interval_ms }, &mut out),
    }
}
