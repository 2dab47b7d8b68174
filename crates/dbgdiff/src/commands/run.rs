//! The run command: collect, compare and report for a file or directory.

use std::path::PathBuf;

use dbgdiff::ledger::Ledger;
use dbgdiff::pipeline::{self, FileResult, FileStatus, RunConfig, RunSummary};
use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal::{self, Progress, Spinner};

/// Handle the `run` command.
pub fn cmd_run(config: &RunConfig) -> i32 {
    let ledger = match config.ledger() {
        Ok(ledger) => ledger,
        Err(e) => {
            terminal::error(&format!("cannot create {}: {e}", config.out_dir.display()));
            return EXIT_FAILURE;
        }
    };
    let (files, skipped) = match pipeline::plan(config, &ledger) {
        Ok(plan) => plan,
        Err(e) => {
            error!(error = %e, "cannot enumerate sources");
            terminal::error(&e.to_string());
            return EXIT_FAILURE;
        }
    };

    if config.source.is_file() {
        return run_single(config, &ledger, &files);
    }

    terminal::info(&format!(
        "{} files with {} and {} ({skipped} already handled)",
        files.len(),
        config.compiler,
        config.debugger
    ));
    let progress = Progress::new(files.len() as u64, "Processing");
    let result = pipeline::run_all(&files, config, &ledger, |result| {
        if let FileStatus::Failed(reason) = &result.status {
            progress.suspend(|| terminal::warning(&format!("{}: {reason}", result.path.display())));
        }
        progress.inc(1);
    });
    progress.finish();

    match result {
        Ok(mut summary) => {
            summary.skipped = skipped;
            print_summary(&summary);
            terminal::path_output(&config.out_dir);
            EXIT_SUCCESS
        }
        Err(e) => {
            terminal::error(&e.to_string());
            EXIT_FAILURE
        }
    }
}

fn run_single(config: &RunConfig, ledger: &Ledger, files: &[PathBuf]) -> i32 {
    let Some(file) = files.first() else {
        return EXIT_FAILURE;
    };
    let spinner = Spinner::new(format!("Processing {}", file.display()));
    let result = pipeline::process_file(file, config, ledger);
    report_single(&spinner, &result);
    terminal::path_output(&config.out_dir);
    if result.is_failure() { EXIT_FAILURE } else { EXIT_SUCCESS }
}

fn report_single(spinner: &Spinner, result: &FileResult) {
    match &result.status {
        FileStatus::Compared { discrepancies, cached } => {
            let source = if *cached { " (cached traces)" } else { "" };
            spinner.finish_with_success(&format!("{discrepancies} discrepancies{source}"));
        }
        FileStatus::Failed(reason) => spinner.finish_with_failure(&format!("{}: {reason}", result.path.display())),
    }
}

fn print_summary(summary: &RunSummary) {
    terminal::header("Summary");
    terminal::success(&format!(
        "{} compared ({} from cache), {} discrepancies",
        summary.compared, summary.cached, summary.discrepancies
    ));
    if summary.skipped > 0 {
        terminal::info(&format!("{} skipped, handled by an earlier run", summary.skipped));
    }
    if summary.failed > 0 {
        terminal::warning(&format!("{} of {} failed:", summary.failed, summary.total()));
        for failure in &summary.failures {
            if let FileStatus::Failed(reason) = &failure.status {
                eprintln!("  {} ({reason})", failure.path.display());
            }
        }
    }
}
