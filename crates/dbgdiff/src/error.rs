use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use dbgdiff_session::{ExitKind, SessionError};
use thiserror::Error;

use crate::compare::CompareError;

/// Step of the per-file pipeline a toolchain command belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Plain `-g` build.
    Cpl,
    /// Sanitizer build.
    SanCpl,
    /// Run of the sanitizer build.
    SanExe,
    /// Run of the plain build, for compilers without sanitizers.
    Exe,
    /// Debugger run.
    Deb,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpl => "CPL",
            Self::SanCpl => "SANCPL",
            Self::SanExe => "SANEXE",
            Self::Exe => "EXE",
            Self::Deb => "DEB",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a toolchain command failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Non-zero exit with an error diagnostic on stderr.
    CompileError,
    /// Non-zero exit without an error diagnostic.
    ExitStatus(i32),
    SegFault,
    Abort,
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompileError => f.write_str("ERROR"),
            Self::ExitStatus(code) => write!(f, "ERROR-{code}"),
            Self::SegFault => f.write_str("SEGFAULT"),
            Self::Abort => f.write_str("SIGABRT"),
            Self::Timeout => f.write_str("TIMEOUT"),
        }
    }
}

/// A compiler or sanitizer run that did not succeed.
#[derive(Error, Debug)]
#[error("{kind} in {phase}: {command}")]
pub struct ToolchainError {
    pub kind: FailureKind,
    pub phase: Phase,
    pub command: String,
    pub stderr: String,
}

/// Errors from collecting and comparing traces.
#[derive(Error, Debug)]
pub enum Error {
    #[error("debugger session: {0}")]
    Session(#[from] SessionError),
    #[error("driving to {target} did not finish within {timeout:?}")]
    DriveTimeout { target: String, timeout: Duration },
    #[error("trace collection did not finish within {timeout:?}")]
    CollectTimeout { timeout: Duration },
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
    #[error("corrupted cache entry {}: {reason}", path.display())]
    CacheCorrupted { path: PathBuf, reason: String },
    #[error(transparent)]
    Compare(#[from] CompareError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Ledger file an error is filed under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerFlag {
    /// One of the fixed `files-<FLAG>.txt` categories.
    Known(String),
    /// Anything else, filed in `files-Other.txt` with its reason.
    Other(String),
}

impl fmt::Display for LedgerFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(flag) => f.write_str(flag),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

impl Error {
    pub fn ledger_flag(&self) -> LedgerFlag {
        match self {
            Self::Toolchain(e) => match e.kind {
                FailureKind::ExitStatus(_) => LedgerFlag::Other(format!("{}-{}", e.kind, e.phase)),
                kind => LedgerFlag::Known(format!("{kind}{}", e.phase)),
            },
            Self::DriveTimeout { .. } | Self::CollectTimeout { .. } => {
                LedgerFlag::Known(format!("{}{}", FailureKind::Timeout, Phase::Deb))
            }
            Self::Session(SessionError::CommandTimeout { .. } | SessionError::LaunchTimeout { .. }) => {
                LedgerFlag::Known("TIMEOUTPEX".to_string())
            }
            Self::Session(SessionError::AbnormalExit(ExitKind::Segfault)) => {
                LedgerFlag::Known(format!("{}{}", FailureKind::SegFault, Phase::Deb))
            }
            Self::Session(SessionError::AbnormalExit(_)) => LedgerFlag::Known("PEXPECTEOF".to_string()),
            other => LedgerFlag::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolchain(kind: FailureKind, phase: Phase) -> Error {
        Error::Toolchain(ToolchainError {
            kind,
            phase,
            command: "gcc -w -g t.c".to_string(),
            stderr: String::new(),
        })
    }

    #[test]
    fn test_ledger_flags() {
        assert_eq!(
            toolchain(FailureKind::CompileError, Phase::Cpl).ledger_flag(),
            LedgerFlag::Known("ERRORCPL".into())
        );
        assert_eq!(
            toolchain(FailureKind::SegFault, Phase::SanExe).ledger_flag(),
            LedgerFlag::Known("SEGFAULTSANEXE".into())
        );
        assert_eq!(
            toolchain(FailureKind::ExitStatus(2), Phase::SanCpl).ledger_flag(),
            LedgerFlag::Other("ERROR-2-SANCPL".into())
        );
        assert_eq!(
            Error::CollectTimeout {
                timeout: Duration::from_secs(1)
            }
            .ledger_flag(),
            LedgerFlag::Known("TIMEOUTDEB".into())
        );
        assert_eq!(
            toolchain(FailureKind::Abort, Phase::Exe).ledger_flag(),
            LedgerFlag::Known("SIGABRTEXE".into())
        );
        let eof = Error::Session(SessionError::AbnormalExit(ExitKind::Exited(1)));
        assert_eq!(eof.ledger_flag(), LedgerFlag::Known("PEXPECTEOF".into()));
    }
}
