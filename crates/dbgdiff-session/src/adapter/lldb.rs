use std::path::Path;
use std::sync::OnceLock;

use dbgdiff_model::{Address, DebuggerKind, Location, StartPoint};
use regex::Regex;

use super::{Adapter, basename};
use crate::ParseMismatch;

/// lldb, and cjdb which shares its command set and output format.
#[derive(Clone, Copy, Debug)]
pub struct Lldb {
    kind: DebuggerKind,
}

const LLDB_SCRIPT: &[&str] = &[
    "settings set use-color false",
    "settings set highlight-source false",
    "settings set auto-confirm true",
    "settings set target.process.thread.step-in-avoid-nodebug true",
    "settings set target.process.thread.step-out-avoid-nodebug true",
    "settings set symbols.enable-external-lookup false",
];

const CJDB_SCRIPT: &[&str] = &[
    "settings set use-color false",
    "settings set highlight-source false",
    "settings set auto-confirm true",
    "settings set target.process.thread.step-in-avoid-nodebug true",
    "settings set target.process.thread.step-out-avoid-nodebug true",
    "settings set symbols.enable-external-lookup false",
    "settings set target.max-children-count 3",
];

static C_ROW_PATTERN: OnceLock<Regex> = OnceLock::new();
static CJ_ROW_PATTERN: OnceLock<Regex> = OnceLock::new();
static C_FRAME_PATTERN: OnceLock<Regex> = OnceLock::new();
static CJ_FRAME_PATTERN: OnceLock<Regex> = OnceLock::new();
static FRAME_ADDRESS_PATTERN: OnceLock<Regex> = OnceLock::new();
static EXITED_PATTERN: OnceLock<Regex> = OnceLock::new();

impl Lldb {
    pub const fn lldb() -> Self {
        Self {
            kind: DebuggerKind::Lldb,
        }
    }

    pub const fn cjdb() -> Self {
        Self {
            kind: DebuggerKind::Cjdb,
        }
    }

    const fn is_cjdb(&self) -> bool {
        matches!(self.kind, DebuggerKind::Cjdb)
    }

    fn row_pattern(&self) -> &'static Regex {
        if self.is_cjdb() {
            CJ_ROW_PATTERN.get_or_init(|| {
                Regex::new(r"^(0x[0-9a-f]+):\s+(.*\.cj):([0-9]+)(?::([0-9]+))?").unwrap()
            })
        } else {
            C_ROW_PATTERN.get_or_init(|| {
                Regex::new(r"^(0x[0-9a-f]+):\s+(.*\.[ch]):([0-9]+)(?::([0-9]+))?").unwrap()
            })
        }
    }

    // Optimized frames may carry trailing markers such as `[opt]` or `[inlined]`.
    fn frame_pattern(&self) -> &'static Regex {
        if self.is_cjdb() {
            CJ_FRAME_PATTERN.get_or_init(|| {
                Regex::new(r"^frame #0: (0x[0-9a-f]+) (?:.* )?at (.*\.cj):([0-9]+)(?::([0-9]+))?(?:\s+\[[^\]]*\])*$")
                    .unwrap()
            })
        } else {
            C_FRAME_PATTERN.get_or_init(|| {
                Regex::new(r"^frame #0: (0x[0-9a-f]+) (?:.* )?at (.*\.[ch]):([0-9]+)(?::([0-9]+))?(?:\s+\[[^\]]*\])*$")
                    .unwrap()
            })
        }
    }

    fn looks_like_source(&self, frame: &str) -> bool {
        if self.is_cjdb() {
            frame.contains(".cj")
        } else {
            frame.contains(".c") || frame.contains(".h")
        }
    }
}

impl Adapter for Lldb {
    fn kind(&self) -> DebuggerKind {
        self.kind
    }

    fn prompt(&self) -> &'static str {
        if self.is_cjdb() { "(cjdb) " } else { "(lldb) " }
    }

    fn program(&self) -> &'static str {
        self.kind.as_str()
    }

    fn launch_args(&self) -> &'static [&'static str] {
        &["-X"]
    }

    fn config_script(&self) -> &'static [&'static str] {
        if self.is_cjdb() { CJDB_SCRIPT } else { LLDB_SCRIPT }
    }

    fn line_table_command(&self, source: &Path) -> String {
        format!("image dump line-table {}", source.display())
    }

    fn parse_line_table(&self, output: &str) -> Vec<Location> {
        let row = self.row_pattern();
        output
            .lines()
            .filter_map(|line| {
                let caps = row.captures(line.trim())?;
                let address = Address::parse(&caps[1])?;
                let number = caps[3].parse().ok()?;
                let column = caps.get(4).and_then(|m| m.as_str().parse().ok());
                Some(Location::new(
                    Some(basename(&caps[2]).to_string()),
                    Some(number),
                    column,
                    address,
                ))
            })
            .collect()
    }

    fn frame_command(&self) -> &'static str {
        "frame info"
    }

    fn parse_frame(&self, output: &str, source_name: &str) -> Result<Option<Location>, ParseMismatch> {
        let Some(frame) = output
            .lines()
            .find_map(|line| line.find("frame #0").map(|at| line[at..].trim()))
        else {
            return Ok(None);
        };

        if let Some(caps) = self.frame_pattern().captures(frame) {
            let mismatch = || ParseMismatch {
                what: "lldb frame",
                text: frame.to_string(),
            };
            let address = Address::parse(&caps[1]).ok_or_else(mismatch)?;
            let line = caps[3].parse().map_err(|_| mismatch())?;
            let column = caps.get(4).and_then(|m| m.as_str().parse().ok());
            let file = basename(&caps[2]);
            let file = (file == source_name).then(|| file.to_string());
            return Ok(Some(Location::new(file, Some(line), column, address)));
        }
        if self.looks_like_source(frame) {
            return Err(ParseMismatch {
                what: "lldb frame",
                text: frame.to_string(),
            });
        }

        let address_only =
            FRAME_ADDRESS_PATTERN.get_or_init(|| Regex::new(r"^frame #0: (0x[0-9a-f]+)").unwrap());
        Ok(address_only
            .captures(frame)
            .and_then(|caps| Address::parse(&caps[1]))
            .map(|address| Location::new(None, None, None, address)))
    }

    fn variable_commands(&self) -> &'static [&'static str] {
        &["frame var"]
    }

    fn process_status_command(&self) -> &'static str {
        "process status"
    }

    fn is_process_alive(&self, output: &str) -> bool {
        let exited = EXITED_PATTERN
            .get_or_init(|| Regex::new(r"Process [0-9]+ exited with status = [0-9]+").unwrap());
        !(exited.is_match(output)
            || output.contains("invalid process")
            || output.contains("requires a current process"))
    }

    fn break_command(&self, start: &StartPoint) -> String {
        match start {
            StartPoint::Entry => "b main".to_string(),
            StartPoint::Address(addr) => format!("b {addr}"),
            StartPoint::Line { file, line } => format!("b {file}:{line}"),
        }
    }

    fn has_caller(&self, backtrace: &str) -> bool {
        backtrace.contains("frame #1")
    }

    fn finish_failed(&self, output: &str) -> bool {
        output.contains("Could not create return address breakpoint")
    }

    fn supports_step_avoid(&self) -> bool {
        self.is_cjdb()
    }

    fn parse_image_list(&self, output: &str) -> Vec<String> {
        output
            .lines()
            .filter(|line| line.contains(".so"))
            .filter_map(|line| line.split_whitespace().last())
            .map(str::to_string)
            .collect()
    }

    fn step_avoid_command(&self, libraries: &[String]) -> Option<String> {
        if !self.is_cjdb() || libraries.is_empty() {
            return None;
        }
        Some(format!(
            "settings set target.process.thread.step-avoid-libraries {}",
            libraries.join(" ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_table() {
        let output = "\
Line table for /tmp/w/t.c in `a.out
0x0000000000001130: /tmp/w/t.c:2
0x0000000000001138: /tmp/w/t.c:3:5
0x0000000000001150: /tmp/w/t.c:4:1
";
        let rows = Lldb::lldb().parse_line_table(output);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], Location::new(Some("t.c".into()), Some(2), None, Address(0x1130)));
        assert_eq!(rows[1].offset, Some(5));
    }

    #[test]
    fn test_cjdb_line_table_only_takes_cj_files() {
        let output = "0x10: /w/main.cj:3:1\n0x20: /w/helper.c:9\n";
        let rows = Lldb::cjdb().parse_line_table(output);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file.as_deref(), Some("main.cj"));
    }

    #[test]
    fn test_parse_frame() {
        let output = "frame #0: 0x0000555555555138 a.out`main at t.c:3:5\n";
        let loc = Lldb::lldb().parse_frame(output, "t.c").unwrap().unwrap();
        assert_eq!(loc, Location::new(Some("t.c".into()), Some(3), Some(5), Address(0x5555_5555_5138)));
    }

    #[test]
    fn test_parse_frame_optimized_marker() {
        let output = "frame #0: 0x0000555555555140 a.out`main at t.c:4:12 [opt]";
        let loc = Lldb::lldb().parse_frame(output, "t.c").unwrap().unwrap();
        assert_eq!(loc.line, Some(4));
        assert_eq!(loc.offset, Some(12));
    }

    #[test]
    fn test_parse_frame_library() {
        let output = "frame #0: 0x00007ffff7c29d90 libc.so.6`__libc_start_call_main + 128";
        let loc = Lldb::lldb().parse_frame(output, "t.c").unwrap().unwrap();
        assert_eq!(loc.file, None);
        assert_eq!(loc.line, None);

        let other = "frame #0: 0x0000555555555200 a.out`helper at util.c:8:3";
        let loc = Lldb::lldb().parse_frame(other, "t.c").unwrap().unwrap();
        assert_eq!(loc.file, None);
        assert_eq!(loc.line, Some(8));
    }

    #[test]
    fn test_parse_frame_mismatch() {
        let output = "frame #0: a.out`main at t.c:3:5";
        assert!(Lldb::lldb().parse_frame(output, "t.c").is_err());
        assert_eq!(Lldb::lldb().parse_frame("error: invalid process", "t.c").unwrap(), None);
    }

    #[test]
    fn test_process_alive() {
        let lldb = Lldb::lldb();
        assert!(!lldb.is_process_alive("Process 4242 exited with status = 0 (0x00000000)"));
        assert!(lldb.is_process_alive("Process 4242 stopped\n* thread #1, name = 'a.out', stop reason = step in"));
    }

    #[test]
    fn test_step_avoid_only_for_cjdb() {
        let listing = "[  0] 1A2B 0x0000555555554000 /w/a.out\n[  1] 3C4D 0x00007ffff7fc5000 /usr/lib/libcangjie-runtime.so\n";
        let cjdb = Lldb::cjdb();
        let libs = cjdb.parse_image_list(listing);
        assert_eq!(libs, vec!["/usr/lib/libcangjie-runtime.so".to_string()]);
        assert_eq!(
            cjdb.step_avoid_command(&libs).as_deref(),
            Some("settings set target.process.thread.step-avoid-libraries /usr/lib/libcangjie-runtime.so")
        );
        assert_eq!(Lldb::lldb().step_avoid_command(&libs), None);
        assert!(!Lldb::lldb().supports_step_avoid());
    }
}
