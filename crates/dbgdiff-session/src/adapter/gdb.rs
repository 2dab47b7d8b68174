use std::path::Path;
use std::sync::OnceLock;

use dbgdiff_model::{Address, DebuggerKind, Location, StartPoint};
use regex::Regex;

use super::{Adapter, basename};
use crate::ParseMismatch;

/// GNU gdb.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gdb;

static SYMTAB_PATTERN: OnceLock<Regex> = OnceLock::new();
static ROW_PATTERN: OnceLock<Regex> = OnceLock::new();
static FRAME_PATTERN: OnceLock<Regex> = OnceLock::new();
static FRAME_ADDRESS_PATTERN: OnceLock<Regex> = OnceLock::new();

impl Adapter for Gdb {
    fn kind(&self) -> DebuggerKind {
        DebuggerKind::Gdb
    }

    fn prompt(&self) -> &'static str {
        "(gdb) "
    }

    fn program(&self) -> &'static str {
        "gdb"
    }

    fn launch_args(&self) -> &'static [&'static str] {
        &["-q", "-nx"]
    }

    fn config_script(&self) -> &'static [&'static str] {
        &[
            "set style enabled off",
            "set confirm off",
            "set width 0",
            "set height 0",
            "set pagination off",
            "set print frame-info location-and-address",
        ]
    }

    // Addresses in the table are relocated only once the inferior runs.
    fn line_table_prelude(&self) -> &'static [&'static str] {
        &["start"]
    }

    fn line_table_command(&self, source: &Path) -> String {
        let pattern = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or_else(|| "*.c".to_string(), |ext| format!("*.{ext}"));
        format!("maint info line-table {pattern}")
    }

    fn parse_line_table(&self, output: &str) -> Vec<Location> {
        let symtab = SYMTAB_PATTERN.get_or_init(|| Regex::new(r"symtab:\s+(.*\.[ch])\s+").unwrap());
        // INDEX LINE ADDRESS [UNRELOCATED-ADDRESS] IS-STMT
        let row = ROW_PATTERN.get_or_init(|| {
            Regex::new(r"^\s*[0-9]+\s+([0-9]+)\s+(0x[0-9a-f]+)\s+(?:0x[0-9a-f]+\s+)?Y").unwrap()
        });

        let mut current: Option<String> = None;
        let mut rows = Vec::new();
        for line in output.lines() {
            if let Some(caps) = symtab.captures(line) {
                current = Some(basename(&caps[1]).to_string());
                continue;
            }
            let Some(caps) = row.captures(line) else {
                continue;
            };
            let (Ok(number), Some(address)) = (caps[1].parse(), Address::parse(&caps[2])) else {
                continue;
            };
            rows.push(Location::new(current.clone(), Some(number), None, address));
        }
        rows
    }

    fn frame_command(&self) -> &'static str {
        "bt -frame-info location-and-address"
    }

    fn parse_frame(&self, output: &str, source_name: &str) -> Result<Option<Location>, ParseMismatch> {
        let Some(start) = output.find("#0") else {
            return Ok(None);
        };
        let rest = &output[start..];
        let end = rest.find("#1").unwrap_or(rest.len());
        let frame = rest[..end].replace('\n', " ");
        let frame = frame.trim();

        let pattern = FRAME_PATTERN.get_or_init(|| {
            Regex::new(r"^#0\s+(0x[0-9a-f]+) .* at (.*\.[ch]):([0-9]+).*$").unwrap()
        });
        if let Some(caps) = pattern.captures(frame) {
            let address = Address::parse(&caps[1]).ok_or_else(|| mismatch(frame))?;
            let line = caps[3].parse().map_err(|_| mismatch(frame))?;
            let file = basename(&caps[2]);
            let file = (file == source_name).then(|| file.to_string());
            return Ok(Some(Location::new(file, Some(line), None, address)));
        }
        if frame.contains(".c") || frame.contains(".h") {
            return Err(mismatch(frame));
        }

        // Library frame without line info: keep the address only.
        let address_only = FRAME_ADDRESS_PATTERN.get_or_init(|| Regex::new(r"^#0\s+(0x[0-9a-f]+)").unwrap());
        Ok(address_only
            .captures(frame)
            .and_then(|caps| Address::parse(&caps[1]))
            .map(|address| Location::new(None, None, None, address)))
    }

    fn variable_commands(&self) -> &'static [&'static str] {
        &["info locals", "info args"]
    }

    fn process_status_command(&self) -> &'static str {
        "info proc"
    }

    fn is_process_alive(&self, output: &str) -> bool {
        !output.contains("No current process")
    }

    fn break_command(&self, start: &StartPoint) -> String {
        match start {
            StartPoint::Entry => "b main".to_string(),
            StartPoint::Address(addr) => format!("b *{addr}"),
            StartPoint::Line { file, line } => format!("b {file}:{line}"),
        }
    }

    fn has_caller(&self, backtrace: &str) -> bool {
        backtrace.contains("#1 ")
    }

    fn finish_failed(&self, output: &str) -> bool {
        output.contains("not meaningful in the outermost frame")
    }
}

fn mismatch(frame: &str) -> ParseMismatch {
    ParseMismatch {
        what: "gdb frame",
        text: frame.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE_TABLE: &str = "\
objfile: /tmp/w/a.out ((struct objfile *) 0x55d0)
compunit_symtab: t.c ((struct compunit_symtab *) 0x55e0)
symtab: /tmp/w/t.c ((struct symtab *) 0x55f0)
linetable: ((struct linetable *) 0x5600):
INDEX  LINE   REL-ADDRESS        UNREL-ADDRESS      IS-STMT PROLOGUE-END
0      2      0x0000555555555129 0x0000000000001129 Y
1      3      0x0000555555555131 0x0000000000001131 Y
2      4      0x0000555555555138 0x0000000000001138
3      END    0x000055555555513f 0x000000000000113f Y
";

    #[test]
    fn test_parse_line_table() {
        let rows = Gdb.parse_line_table(LINE_TABLE);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].file.as_deref(), Some("t.c"));
        assert_eq!(rows[0].line, Some(2));
        assert_eq!(rows[0].offset, None);
        assert_eq!(rows[1].address, Address(0x5555_5555_5131));
    }

    #[test]
    fn test_parse_line_table_single_address_column() {
        let output = "symtab: /w/t.c ((struct symtab *) 0x1)\n0      7      0x0000000000401126 Y\n";
        let rows = Gdb.parse_line_table(output);
        assert_eq!(rows, vec![Location::new(Some("t.c".into()), Some(7), None, Address(0x0040_1126))]);
    }

    #[test]
    fn test_parse_frame_user_code() {
        let output = "#0  0x0000555555555131 in main () at /tmp/w/t.c:3\n";
        let loc = Gdb.parse_frame(output, "t.c").unwrap().unwrap();
        assert_eq!(loc, Location::new(Some("t.c".into()), Some(3), None, Address(0x5555_5555_5131)));
    }

    #[test]
    fn test_parse_frame_other_file_is_library() {
        let output = "#0  0x00007ffff7c29d90 in __libc_start_call_main (main=main@entry=0x1, argc=1) at ../sysdeps/nptl/libc_start_call_main.h:74\n#1  0x00007ffff7c29e40 in __libc_start_main_impl () at ../csu/libc-start.c:392\n";
        let loc = Gdb.parse_frame(output, "t.c").unwrap().unwrap();
        assert_eq!(loc.file, None);
        assert_eq!(loc.line, Some(74));
    }

    #[test]
    fn test_parse_frame_without_line_info() {
        let output = "#0  0x00007ffff7e1b2a0 in puts () from /lib/x86_64-linux-gnu/libc.so.6\n";
        let loc = Gdb.parse_frame(output, "t.c").unwrap().unwrap();
        assert_eq!(loc, Location::new(None, None, None, Address(0x7fff_f7e1_b2a0)));
    }

    #[test]
    fn test_parse_frame_mismatch() {
        let output = "#0  main () at t.c:3\n";
        assert!(Gdb.parse_frame(output, "t.c").is_err());
        assert_eq!(Gdb.parse_frame("No stack.", "t.c").unwrap(), None);
    }

    #[test]
    fn test_process_alive() {
        assert!(!Gdb.is_process_alive("No current process: you must name one."));
        assert!(Gdb.is_process_alive("process 4242\ncmdline = '/tmp/a.out'"));
    }

    #[test]
    fn test_break_commands() {
        assert_eq!(Gdb.break_command(&StartPoint::Entry), "b main");
        assert_eq!(Gdb.break_command(&StartPoint::Address(Address(0x10))), "b *0x10");
        assert_eq!(
            Gdb.break_command(&StartPoint::Line {
                file: "t.c".into(),
                line: 4
            }),
            "b t.c:4"
        );
    }

    #[test]
    fn test_line_table_command_uses_extension() {
        assert_eq!(Gdb.line_table_command(Path::new("/w/t.c")), "maint info line-table *.c");
    }
}
