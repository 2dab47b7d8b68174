//! dbgdiff CLI - differential testing of debuggers

mod cli;
mod commands;
mod terminal;

use std::fs::File;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use cli::{Cli, EXIT_FAILURE};

fn main() {
    let cli = Cli::parse();

    // Initialize metrics recorder if enabled
    let metrics_handle = if cli.metrics {
        dbgdiff::metrics::CliRecorder::new().install()
    } else {
        None
    };
    dbgdiff::metrics::init();

    let default_level = if cli.verbose {
        "dbgdiff=debug"
    } else if cli.silent {
        "dbgdiff=error"
    } else {
        "dbgdiff=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE);
    match &cli.log_file {
        Some(path) => match File::create(path) {
            Ok(file) => subscriber.with_writer(Mutex::new(file)).with_ansi(false).init(),
            Err(e) => {
                terminal::error(&format!("cannot open log file {}: {e}", path.display()));
                std::process::exit(EXIT_FAILURE);
            }
        },
        None => subscriber.with_writer(std::io::stderr).init(),
    }

    let exit_code = commands::run_command(&cli);

    // Print metrics summary if enabled
    if let Some(handle) = metrics_handle {
        handle.print_summary();
    }

    std::process::exit(exit_code);
}
