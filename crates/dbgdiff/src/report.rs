//! Discrepancy report files.
//!
//! One append-only file per method, check, view and debugger at
//! `<out>/<method>/diff-<Check>-<view>-<debugger>.txt`, one line per
//! discrepancy.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use dbgdiff_model::{DebuggerKind, View};

use crate::compare::{Check, Discrepancy, Method};
use crate::metrics;

pub struct ReportWriter {
    out: PathBuf,
}

impl ReportWriter {
    pub fn new(out: impl Into<PathBuf>) -> Self {
        Self { out: out.into() }
    }

    pub fn path(&self, method: Method, check: Check, view: View, debugger: DebuggerKind) -> PathBuf {
        self.out
            .join(method.as_str())
            .join(format!("diff-{check}-{view}-{debugger}.txt"))
    }

    /// Append every discrepancy to its report file.
    ///
    /// Lines for one file are written in a single append so reports from
    /// concurrent workers stay line-aligned.
    pub fn write(&self, found: &[Discrepancy]) -> io::Result<usize> {
        let mut grouped: BTreeMap<PathBuf, String> = BTreeMap::new();
        for discrepancy in found {
            let path = self.path(
                discrepancy.method,
                discrepancy.check,
                discrepancy.view,
                discrepancy.left.debugger,
            );
            let text = grouped.entry(path).or_default();
            text.push_str(&discrepancy.to_string());
            text.push('\n');
            metrics::record_discrepancy(discrepancy);
        }

        for (path, text) in &grouped {
            append(path, text)?;
        }
        Ok(found.len())
    }
}

fn append(path: &Path, text: &str) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use dbgdiff_model::{Configuration, PointKey, Stepping};

    use super::*;
    use crate::compare::{DiscrepancyKind, Side};

    fn missing(line: u32, view: View) -> Discrepancy {
        let left = Configuration::new("gcc", "-O1".parse().unwrap(), DebuggerKind::Gdb);
        Discrepancy {
            method: Method::Step,
            check: Check::Existence,
            view,
            file: "/src/t.c".into(),
            right: left.clone().with_stepping(Stepping::Instruction),
            left,
            kind: DiscrepancyKind::Missing {
                key: PointKey::Loc {
                    file: Some("t.c".into()),
                    line: Some(line),
                },
                side: Side::LeftOnly,
                text: Some("x++;".into()),
            },
        }
    }

    #[test]
    fn test_files_per_check_and_view() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());
        let found = [missing(3, View::Loc), missing(4, View::Loc), missing(3, View::All)];
        assert_eq!(writer.write(&found).unwrap(), 3);
        // Appends on a second write.
        writer.write(&found[..1]).unwrap();

        let loc = fs::read_to_string(dir.path().join("step/diff-Exist-loc-gdb.txt")).unwrap();
        assert_eq!(loc.lines().count(), 3);
        assert!(loc.lines().all(|line| line.starts_with("/src/t.c, left [")));
        assert!(loc.contains("[in stepl not in stepi]"));

        let all = fs::read_to_string(dir.path().join("step/diff-Exist-all-gdb.txt")).unwrap();
        assert_eq!(all.lines().count(), 1);
    }
}
