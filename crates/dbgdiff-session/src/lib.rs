//! Debugger sessions over a pseudo-terminal.
//!
//! A [`Session`] owns one gdb, lldb or cjdb process. Commands are written to
//! the terminal and answered once the debugger prints its prompt again. The
//! debugger-specific command set and output grammar live behind the
//! [`Adapter`] trait; [`extract`] and [`vars`] turn raw output into model
//! values.

pub mod adapter;
mod channel;
pub mod extract;
mod session;
mod transcript;
pub mod vars;

use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use nix::sys::signal::Signal;
use thiserror::Error;

pub use adapter::{Adapter, StepKind, adapter_for};
pub use channel::Channel;
pub use extract::{current_frame, static_line_table};
pub use session::{Session, SessionOptions};
pub use vars::{frame_variables, parse_snapshot};

/// How a debugger process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    Segfault,
    Signal(String),
    Exited(i32),
    Unknown,
}

impl ExitKind {
    pub fn from_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.signal(), status.code()) {
            (Some(sig), _) if sig == Signal::SIGSEGV as i32 => Self::Segfault,
            (Some(sig), _) => Self::Signal(
                Signal::try_from(sig).map_or_else(|_| sig.to_string(), |s| s.as_str().to_string()),
            ),
            (None, Some(code)) => Self::Exited(code),
            (None, None) => Self::Unknown,
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segfault => f.write_str("segmentation fault"),
            Self::Signal(name) => write!(f, "killed by {name}"),
            Self::Exited(code) => write!(f, "exit status {code}"),
            Self::Unknown => f.write_str("unknown status"),
        }
    }
}

/// Session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{program} showed no prompt within {timeout:?}")]
    LaunchTimeout { program: String, timeout: Duration },
    #[error("no prompt within {timeout:?} after {command:?}")]
    CommandTimeout { command: String, timeout: Duration },
    #[error("debugger ended unexpectedly: {0}")]
    AbnormalExit(ExitKind),
    #[error("pseudo-terminal error: {0}")]
    Pty(#[from] nix::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Debugger output that should have matched a known shape but did not.
///
/// Recovered where it is raised: the caller logs it and carries on without
/// the value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized {what}: {text:?}")]
pub struct ParseMismatch {
    pub what: &'static str,
    pub text: String,
}
