//! Command implementations.

mod compare;
mod inspect;
mod run;

use std::path::{Path, PathBuf};
use std::time::Duration;

use dbgdiff::FileTraces;
use dbgdiff::View;
use dbgdiff::pipeline::RunConfig;
use dbgdiff_session::{SessionOptions, static_line_table};
use tracing::error;

use crate::cli::{Cli, Commands, EXIT_FAILURE, EXIT_SUCCESS, ToolArgs};
use crate::terminal::{self, Spinner};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Run { .. } => handle_run(cli),
        Commands::Compare { .. } => handle_compare(cli),
        Commands::Inspect { .. } => handle_inspect(cli),
        Commands::LineTable { .. } => handle_line_table(cli),
    }
}

fn handle_run(cli: &Cli) -> i32 {
    let Commands::Run {
        source,
        tools,
        timeout,
        parallel,
        start_points,
        validate,
        seed,
        transcripts,
        debugger_path,
    } = &cli.command
    else {
        unreachable!("run command variant mismatch");
    };

    let Some(config) = run_config(source, tools) else {
        return EXIT_FAILURE;
    };
    let config = config
        .with_timeout(Duration::from_secs(*timeout))
        .with_parallel(*parallel)
        .with_start_points(*start_points)
        .with_validate(*validate)
        .with_seed(*seed)
        .with_transcript_dir(transcripts.clone())
        .with_debugger_program(debugger_path.clone());
    run::cmd_run(&config)
}

fn handle_compare(cli: &Cli) -> i32 {
    let Commands::Compare {
        source,
        tools,
        validate,
    } = &cli.command
    else {
        unreachable!("compare command variant mismatch");
    };

    let Some(config) = run_config(source, tools) else {
        return EXIT_FAILURE;
    };
    compare::cmd_compare(&config.with_validate(*validate))
}

fn handle_inspect(cli: &Cli) -> i32 {
    let Commands::Inspect {
        source,
        tools,
        opt,
        against,
        view,
        differing,
    } = &cli.command
    else {
        unreachable!("inspect command variant mismatch");
    };

    let Some(config) = run_config(source, tools) else {
        return EXIT_FAILURE;
    };
    let Some(traces) = cached_traces(&config) else {
        return EXIT_FAILURE;
    };
    inspect::cmd_inspect(&config, &traces, opt, against.as_ref(), *view, *differing)
}

fn handle_line_table(cli: &Cli) -> i32 {
    let Commands::LineTable {
        binary,
        source,
        debugger,
        view,
        timeout,
    } = &cli.command
    else {
        unreachable!("line-table command variant mismatch");
    };

    let spinner = Spinner::new(format!("Reading line table with {debugger}"));
    let options = SessionOptions::default().with_timeout(Duration::from_secs(*timeout));
    match static_line_table(binary, source, *debugger, &options) {
        Ok(image) => {
            spinner.finish_with_success(&format!("{} rows", image.len()));
            let points = image.project(*view);
            for point in &points {
                println!("{point}");
            }
            if *view != View::All {
                terminal::info(&format!("{} distinct points at {view}", points.len()));
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            spinner.finish_with_failure(&format!("line table failed: {e}"));
            EXIT_FAILURE
        }
    }
}

/// Run configuration from the shared tool arguments.
fn run_config(source: &Path, tools: &ToolArgs) -> Option<RunConfig> {
    match tools.resolve() {
        Ok((compiler, debugger)) => {
            Some(RunConfig::new(absolute(source), compiler, debugger).with_out_dir(&tools.out))
        }
        Err(e) => {
            error!(error = %e, "invalid compiler");
            terminal::error(&e);
            None
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// The cached traces of the configured source, reporting why there are none.
fn cached_traces(config: &RunConfig) -> Option<FileTraces> {
    let cache = config.cache();
    match cache.load(&config.source, config.compiler.name(), config.debugger) {
        Ok(Some(traces)) => Some(traces),
        Ok(None) => {
            terminal::error(&format!(
                "no cached traces for {} with {} and {}; collect them with `dbgdiff run` first",
                config.source.display(),
                config.compiler,
                config.debugger
            ));
            None
        }
        Err(e) => {
            terminal::error(&e.to_string());
            None
        }
    }
}
