//! Append-only record of what happened to every source file.
//!
//! Each outcome category has its own `files-<FLAG>.txt` under
//! `<out>/<debugger>/`. Lines start with the source path, so a later run over
//! the same directory can skip files that were already handled.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use dbgdiff_model::{DebuggerKind, DrivePolicy, OptLevel, StartPoint};

use crate::error::LedgerFlag;

const ALL_FILES: &str = "files-ALL.txt";
const OTHER_FILES: &str = "files-Other.txt";
const DONE_FILES: &str = "files-Done.txt";
const FAILED_DRIVES: &str = "files-FailDrive.txt";

pub struct Ledger {
    dir: PathBuf,
}

impl Ledger {
    /// Ledger for one debugger under the output directory `out`.
    pub fn open(out: &Path, debugger: DebuggerKind) -> io::Result<Self> {
        let dir = out.join(debugger.as_str());
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List every enumerated file, once per output directory.
    pub fn record_all(&self, files: &[PathBuf]) -> io::Result<()> {
        let path = self.dir.join(ALL_FILES);
        if path.exists() {
            return Ok(());
        }
        let mut text = String::new();
        for file in files {
            text.push_str(&file.display().to_string());
            text.push('\n');
        }
        append(&path, &text)
    }

    pub fn record_failure(
        &self,
        file: &Path,
        compiler: &str,
        debugger: DebuggerKind,
        flag: &LedgerFlag,
    ) -> io::Result<()> {
        match flag {
            LedgerFlag::Known(name) => append(
                &self.dir.join(format!("files-{name}.txt")),
                &format!("{},{compiler},{debugger}\n", file.display()),
            ),
            LedgerFlag::Other(reason) => append(
                &self.dir.join(OTHER_FILES),
                &format!("{},{compiler},{debugger},{}\n", file.display(), one_line(reason)),
            ),
        }
    }

    /// A file whose traces were collected and compared.
    pub fn record_done(&self, file: &Path, compiler: &str, debugger: DebuggerKind) -> io::Result<()> {
        append(
            &self.dir.join(DONE_FILES),
            &format!("{},{compiler},{debugger}\n", file.display()),
        )
    }

    /// A start-point run whose drive never reached its target.
    pub fn record_failed_drive(
        &self,
        binary: &Path,
        opt: &OptLevel,
        start: &StartPoint,
        drive: DrivePolicy,
        reason: &str,
    ) -> io::Result<()> {
        append(
            &self.dir.join(FAILED_DRIVES),
            &format!(
                "{}, opt, {opt}, point, {start}, way, {drive}, {}\n",
                binary.display(),
                one_line(reason)
            ),
        )
    }

    /// Source files already recorded under any outcome.
    ///
    /// Relative paths are taken relative to the current directory.
    pub fn handled_files(&self) -> io::Result<BTreeSet<PathBuf>> {
        let cwd = std::env::current_dir()?;
        let mut handled = BTreeSet::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("files-")
                || !name.ends_with(".txt")
                || name == ALL_FILES
                || name == FAILED_DRIVES
            {
                continue;
            }
            for line in fs::read_to_string(&path)?.lines() {
                let Some(file) = line.split(',').next().map(str::trim).filter(|f| !f.is_empty()) else {
                    continue;
                };
                let file = Path::new(file);
                handled.insert(if file.is_absolute() {
                    file.to_path_buf()
                } else {
                    cwd.join(file)
                });
            }
        }
        Ok(handled)
    }
}

/// Append `text` with a single write on an `O_APPEND` handle, so concurrent
/// writers never interleave within a record.
fn append(path: &Path, text: &str) -> io::Result<()> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(text.as_bytes())
}

fn one_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}
