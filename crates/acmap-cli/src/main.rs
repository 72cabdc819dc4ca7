mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod table;
mod utils;

use clap::Parser;
use cli::{Cli, Commands};
use error::{CliError, Result};
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Error: Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "acmap CLI starting.");

    match run(cli) {
        Ok(()) => info!("Command finished successfully."),
        Err(e) => {
            error!("{}", e);
            eprintln!("\nError: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| CliError::Other(e.into()))?;
    }
    let show_progress = !cli.quiet;

    match cli.command {
        Commands::Relax(args) => commands::relax::run(args, cli.threads, show_progress),
        Commands::GridTest(args) => commands::grid_test::run(args, cli.threads, show_progress),
        Commands::Avidity(args) => commands::avidity::run(args, cli.threads, show_progress),
        Commands::Compare(args) => commands::compare::run(args),
        Commands::Merge(args) => commands::merge::run(args),
    }
}
