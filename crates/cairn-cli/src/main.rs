mod cli;
mod commands;
mod config;
mod engine;
mod error;
mod logging;
mod toolkit;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\nerror: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, &cli.log_file)?;

    info!("cairn v{}", env!("CARGO_PKG_VERSION"));
    debug!("arguments: {:?}", &cli);

    let outcome = match cli.command {
        Commands::Sample(args) => commands::sample::run(args),
        Commands::Scan(args) => commands::scan::run(args),
        Commands::Refine(args) => commands::refine::run(args),
    };

    match &outcome {
        Ok(()) => {
            info!("run finished");
            println!("\nDone.");
        }
        Err(e) => error!("run failed: {}", e),
    }
    outcome
}
