use crate::error::{CliError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

/// Maps the -v/-q flags onto the console log level.
///
/// The filter applies to the console layer only; the log file, when enabled,
/// records every level including trace.
fn console_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Opens the campaign log in append mode so that repeated invocations
/// against the same job file accumulate into a single log.
fn open_log_file(path: &Path) -> Result<File> {
    File::options()
        .create(true)
        .append(true)
        .open(path)
        .map_err(CliError::Io)
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: &Option<PathBuf>) -> Result<()> {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .without_time()
        .compact()
        .with_filter(console_filter(verbosity, quiet));

    let registry = tracing_subscriber::registry().with(console_layer);

    match log_file {
        Some(path) => {
            let file_layer = fmt::layer()
                .with_writer(open_log_file(path)?)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_target(true);
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }

    Ok(())
}
