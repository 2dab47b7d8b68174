//! Compiling the programs under test.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};

use dbgdiff_model::OptLevel;
use nix::sys::signal::Signal;
use tracing::debug;

use crate::error::{FailureKind, Phase, ToolchainError};

/// Compiler family, detected from the command name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompilerKind {
    Gcc,
    Clang,
    /// The Cangjie compiler.
    Cjc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Compiler {
    command: String,
    kind: CompilerKind,
}

impl Compiler {
    /// The command as given, e.g. `/usr/bin/gcc-13`.
    pub fn as_str(&self) -> &str {
        &self.command
    }

    /// Basename of the command.
    pub fn name(&self) -> &str {
        self.command.rsplit('/').next().unwrap_or(&self.command)
    }

    pub const fn kind(&self) -> CompilerKind {
        self.kind
    }

    /// Optimization levels traces are collected at.
    pub fn opt_levels(&self) -> Vec<OptLevel> {
        let levels: &[&str] = match self.kind {
            CompilerKind::Gcc | CompilerKind::Clang => &["-O0", "-Og", "-O1", "-O2", "-O3"],
            CompilerKind::Cjc => &["-O0", "-O1", "-O2"],
        };
        levels.iter().filter_map(|level| level.parse().ok()).collect()
    }

    /// Suffix of the source files this compiler takes.
    pub const fn suffix(&self) -> &'static str {
        match self.kind {
            CompilerKind::Gcc | CompilerKind::Clang => ".c",
            CompilerKind::Cjc => ".cj",
        }
    }

    /// Whether the sanitizer pre-check applies.
    pub const fn supports_sanitizers(&self) -> bool {
        !matches!(self.kind, CompilerKind::Cjc)
    }

    /// Make sure `source` builds and its sanitized build runs cleanly.
    ///
    /// Without sanitizers the plain build is run instead. Binaries are
    /// written to `workdir`.
    pub fn check(&self, source: &Path, workdir: &Path, timeout: Duration) -> Result<(), ToolchainError> {
        let binary = workdir.join("a.out");
        let mut plain = self.command();
        plain.arg("-g").arg(source).arg("-o").arg(&binary);
        run(&mut plain, workdir, timeout, Phase::Cpl)?;

        if !self.supports_sanitizers() {
            return run(&mut Command::new(&binary), workdir, timeout, Phase::Exe);
        }
        let sanitized = workdir.join("san.out");
        let mut build = self.command();
        build
            .arg("-fsanitize=address,undefined,leak")
            .arg(source)
            .arg("-o")
            .arg(&sanitized);
        run(&mut build, workdir, timeout, Phase::SanCpl)?;
        run(&mut Command::new(&sanitized), workdir, timeout, Phase::SanExe)
    }

    /// A command for this compiler, with warnings silenced where supported.
    fn command(&self) -> Command {
        let mut command = Command::new(&self.command);
        if self.kind != CompilerKind::Cjc {
            command.arg("-w");
        }
        command
    }

    /// Build a debug binary of `source` at `opt`.
    pub fn compile(
        &self,
        source: &Path,
        opt: &OptLevel,
        output: &Path,
        timeout: Duration,
    ) -> Result<(), ToolchainError> {
        let mut command = self.command();
        command.arg("-g").arg(opt.as_str()).arg(source).arg("-o").arg(output);
        let workdir = output.parent().unwrap_or_else(|| Path::new("."));
        run(&mut command, workdir, timeout, Phase::Cpl)
    }
}

impl FromStr for Compiler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.rsplit('/').next().unwrap_or(s);
        let kind = if name.contains("clang") {
            CompilerKind::Clang
        } else if name.starts_with("cjc") {
            CompilerKind::Cjc
        } else if name.contains("gcc") || name == "cc" {
            CompilerKind::Gcc
        } else {
            return Err(format!("unrecognized compiler {s:?}, expected gcc, clang or cjc"));
        };
        Ok(Self {
            command: s.to_string(),
            kind,
        })
    }
}

impl fmt::Display for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

// ============================================================================
// Running commands
// ============================================================================

/// Run `command` in `workdir`, bounded by `timeout`, and classify a failure.
fn run(command: &mut Command, workdir: &Path, timeout: Duration, phase: Phase) -> Result<(), ToolchainError> {
    let line = format!("{command:?}");
    let fail = |kind: FailureKind, stderr: String| ToolchainError {
        kind,
        phase,
        command: line.clone(),
        stderr,
    };

    let mut stderr = tempfile::tempfile().map_err(|e| fail(FailureKind::CompileError, e.to_string()))?;
    let sink = stderr
        .try_clone()
        .map_err(|e| fail(FailureKind::CompileError, e.to_string()))?;
    command
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(sink));

    debug!(%phase, command = %line, "running");
    let status = match run_command_with_timeout(command, timeout) {
        Ok(status) => status,
        Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(fail(FailureKind::Timeout, String::new())),
        Err(e) => return Err(fail(FailureKind::CompileError, e.to_string())),
    };
    if status.success() {
        return Ok(());
    }

    let text = read_back(&mut stderr).unwrap_or_default();
    Err(fail(classify(status, &text), text))
}

fn classify(status: ExitStatus, stderr: &str) -> FailureKind {
    let signal = status.signal();
    let code = status.code();
    if signal == Some(Signal::SIGSEGV as i32) || code == Some(139) {
        FailureKind::SegFault
    } else if signal == Some(Signal::SIGABRT as i32) || code == Some(134) {
        FailureKind::Abort
    } else if stderr.to_lowercase().contains("error") {
        FailureKind::CompileError
    } else {
        FailureKind::ExitStatus(code.unwrap_or(-1))
    }
}

fn read_back(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Spawn `cmd` and wait for it, killing it once `timeout` has passed.
pub fn run_command_with_timeout(cmd: &mut Command, timeout: Duration) -> io::Result<ExitStatus> {
    let mut child = cmd.spawn()?;
    let start = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(io::ErrorKind::TimedOut, "command timed out"));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
