//! dbgdiff - differential testing of source-level debuggers
//!
//! Compiles a program at several optimization levels, steps it under gdb,
//! lldb or cjdb by source line and by instruction, and compares the traces.
//!
//! # Example
//!
//! ```ignore
//! use dbgdiff::pipeline::{RunConfig, process_file};
//! use dbgdiff::DebuggerKind;
//!
//! let config = RunConfig::new("t.c", "gcc".parse()?, DebuggerKind::Gdb);
//! let ledger = config.ledger()?;
//! let result = process_file(&config.source, &config, &ledger);
//! ```

// Re-export from sub-crates
pub use dbgdiff_model::{
    Address, Axis, Configuration, DebuggerKind, DrivePolicy, FileTraces, Image, Location, OptLevel, StartPoint,
    Stepping, Trace, VarSnapshot, View,
};
pub use dbgdiff_session::{ExitKind, SessionError, SessionOptions};

pub mod cache;
pub mod collect;
pub mod compare;
mod error;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod toolchain;

pub use error::{Error, FailureKind, LedgerFlag, Phase, Result, ToolchainError};
