//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dbgdiff::toolchain::{Compiler, CompilerKind};
use dbgdiff::{DebuggerKind, OptLevel, View};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "dbgdiff")]
#[command(about = "Differential testing of debuggers - compares step traces across stepping and optimization")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Compiler and debugger selection shared by the subcommands.
#[derive(clap::Args, Clone)]
pub struct ToolArgs {
    /// Compiler command (gcc, clang, cjc or a path to one). Derived from
    /// the debugger if not given.
    #[arg(short, long)]
    pub compiler: Option<Compiler>,

    /// Debugger under test (gdb, lldb, cjdb). Derived from the compiler if
    /// not given, otherwise lldb.
    #[arg(short, long)]
    pub debugger: Option<DebuggerKind>,

    /// Output directory for the ledger, reports and trace cache
    #[arg(short, long, default_value = "Expr")]
    pub out: PathBuf,
}

impl ToolArgs {
    /// The compiler and debugger to use, each defaulting from the other.
    pub fn resolve(&self) -> Result<(Compiler, DebuggerKind), String> {
        let debugger = self.debugger.unwrap_or_else(|| match self.compiler.as_ref().map(Compiler::kind) {
            Some(CompilerKind::Gcc) => DebuggerKind::Gdb,
            Some(CompilerKind::Cjc) => DebuggerKind::Cjdb,
            Some(CompilerKind::Clang) | None => DebuggerKind::Lldb,
        });
        let compiler = match &self.compiler {
            Some(compiler) => compiler.clone(),
            None => debugger.default_compiler().parse()?,
        };
        Ok((compiler, debugger))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect traces for a file or directory and report discrepancies
    Run {
        /// Source file, or a directory searched recursively
        #[arg(short = 'S', long, value_name = "PATH")]
        source: PathBuf,

        #[command(flatten)]
        tools: ToolArgs,

        /// Bound on each compile and debugger run, in seconds
        #[arg(short, long, default_value = "300")]
        timeout: u64,

        /// Process files in parallel (directories only)
        #[arg(short, long)]
        parallel: bool,

        /// Also collect from every line-table point under every drive policy
        #[arg(long)]
        start_points: bool,

        /// Only compare points present in the static line table
        #[arg(long)]
        validate: bool,

        /// Seed for random stepping
        #[arg(long)]
        seed: Option<u64>,

        /// Write a transcript of every debugger session to this directory
        #[arg(long, value_name = "DIR")]
        transcripts: Option<PathBuf>,

        /// Debugger executable, when not the debugger's default name
        #[arg(long, value_name = "PROGRAM")]
        debugger_path: Option<String>,
    },
    /// Compare the cached traces of a file again, without a debugger
    Compare {
        /// Source file whose traces are cached
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[command(flatten)]
        tools: ToolArgs,

        /// Only compare points present in the static line table
        #[arg(long)]
        validate: bool,
    },
    /// Show the points two cached traces share, with hit counts
    Inspect {
        /// Source file whose traces are cached
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[command(flatten)]
        tools: ToolArgs,

        /// Optimization level of the traces
        #[arg(long, default_value = "-O0", allow_hyphen_values = true)]
        opt: OptLevel,

        /// Compare line-stepped traces at this level instead of stepl against stepi
        #[arg(long, allow_hyphen_values = true)]
        against: Option<OptLevel>,

        /// Granularity of the shared points
        #[arg(long, default_value = "loc")]
        view: View,

        /// Only show points whose hit counts differ
        #[arg(long)]
        differing: bool,
    },
    /// Print the static line table a debugger reports for a binary
    LineTable {
        /// Binary built with debug info
        #[arg(value_name = "BINARY")]
        binary: PathBuf,

        /// Source file the table is for
        #[arg(long, value_name = "FILE")]
        source: PathBuf,

        /// Debugger to ask
        #[arg(short, long, default_value = "gdb")]
        debugger: DebuggerKind,

        /// Projection of each row
        #[arg(long, default_value = "all")]
        view: View,

        /// Seconds to wait for the debugger
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_tool_defaults() {
        let cli = Cli::parse_from(["dbgdiff", "run", "-S", "t.c", "-c", "gcc"]);
        let Commands::Run { tools, .. } = &cli.command else {
            panic!("expected run");
        };
        let (compiler, debugger) = tools.resolve().unwrap();
        assert_eq!((compiler.name(), debugger), ("gcc", DebuggerKind::Gdb));

        let cli = Cli::parse_from(["dbgdiff", "compare", "t.cj", "-d", "cjdb"]);
        let Commands::Compare { tools, .. } = &cli.command else {
            panic!("expected compare");
        };
        let (compiler, debugger) = tools.resolve().unwrap();
        assert_eq!((compiler.kind(), debugger), (CompilerKind::Cjc, DebuggerKind::Cjdb));

        let cli = Cli::parse_from(["dbgdiff", "inspect", "t.c", "--opt", "-O2"]);
        let Commands::Inspect { tools, opt, view, .. } = &cli.command else {
            panic!("expected inspect");
        };
        assert_eq!(tools.resolve().unwrap().1, DebuggerKind::Lldb);
        assert_eq!(opt.as_str(), "-O2");
        assert_eq!(*view, View::Loc);
    }
}
