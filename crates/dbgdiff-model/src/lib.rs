//! Data model for debugger differential testing.
//!
//! A debugger run is reduced to a [`Trace`]: the program points it stopped at,
//! how often, and the variables it showed there. Traces are compared through
//! [`View`]s, projections of the full `(file, line, offset, address)` tuple.

mod address;
mod config;
mod image;
mod location;
pub mod nested;
mod snapshot;
mod trace;

pub use address::*;
pub use config::*;
pub use image::*;
pub use location::*;
pub use snapshot::*;
pub use trace::*;

use thiserror::Error;

/// Errors from parsing model values out of text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
    #[error("invalid view {0:?}, expected one of: loc, adr, pos, all")]
    InvalidView(String),
    #[error("invalid stepping strategy {0:?}, expected one of: stepl, stepi, random")]
    InvalidStepping(String),
    #[error("invalid debugger {0:?}, expected one of: gdb, lldb, cjdb")]
    InvalidDebugger(String),
    #[error("invalid start point {0:?}, expected main, 0xADDR or FILE:LINE")]
    InvalidStartPoint(String),
    #[error("invalid optimization level {0:?}")]
    InvalidOptLevel(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
