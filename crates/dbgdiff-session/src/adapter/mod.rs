//! Debugger-specific commands and output grammars.

mod gdb;
mod lldb;

use std::path::Path;

use dbgdiff_model::{DebuggerKind, Location, StartPoint};

use crate::ParseMismatch;

pub use gdb::Gdb;
pub use lldb::Lldb;

/// Single-step granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    Line,
    Instruction,
}

/// What differs between debuggers: how to start one, what to type, and how
/// to read what comes back.
pub trait Adapter: Send + Sync {
    fn kind(&self) -> DebuggerKind;

    /// Prompt printed when the debugger waits for input.
    fn prompt(&self) -> &'static str;

    /// Executable to launch.
    fn program(&self) -> &'static str;

    fn launch_args(&self) -> &'static [&'static str];

    /// Commands that turn off colors, paging and confirmations.
    fn config_script(&self) -> &'static [&'static str];

    fn load_command(&self, binary: &Path) -> String {
        format!("file {}", binary.display())
    }

    /// Commands to run before the line table is dumped.
    fn line_table_prelude(&self) -> &'static [&'static str] {
        &[]
    }

    fn line_table_command(&self, source: &Path) -> String;

    /// Line-table rows, with files reduced to basenames.
    fn parse_line_table(&self, output: &str) -> Vec<Location>;

    fn frame_command(&self) -> &'static str;

    /// The innermost frame as a location.
    ///
    /// A frame outside `source_name` comes back with `file: None`. `Ok(None)`
    /// means the output holds no frame at all.
    fn parse_frame(&self, output: &str, source_name: &str) -> Result<Option<Location>, ParseMismatch>;

    /// Commands whose output lists the visible variables.
    fn variable_commands(&self) -> &'static [&'static str];

    fn process_status_command(&self) -> &'static str;

    /// Whether the inferior is still running according to `process_status_command` output.
    fn is_process_alive(&self, output: &str) -> bool;

    fn break_command(&self, start: &StartPoint) -> String;

    fn step_command(&self, kind: StepKind) -> &'static str {
        match kind {
            StepKind::Line => "step",
            StepKind::Instruction => "stepi",
        }
    }

    fn run_command(&self) -> &'static str {
        "run"
    }

    fn backtrace_command(&self) -> &'static str {
        "bt"
    }

    /// Whether a backtrace shows a frame above the innermost one.
    fn has_caller(&self, backtrace: &str) -> bool;

    fn finish_command(&self) -> &'static str {
        "finish"
    }

    /// Whether `finish` refused to run.
    fn finish_failed(&self, output: &str) -> bool;

    /// Whether stepping can be told to skip named shared objects.
    fn supports_step_avoid(&self) -> bool {
        false
    }

    /// Command listing loaded shared objects.
    fn image_list_command(&self) -> &'static str {
        "image list"
    }

    /// Shared-object paths named in `image_list_command` output.
    fn parse_image_list(&self, output: &str) -> Vec<String> {
        let _ = output;
        Vec::new()
    }

    /// Setting that makes stepping skip the shared objects in `libraries`.
    fn step_avoid_command(&self, libraries: &[String]) -> Option<String> {
        let _ = libraries;
        None
    }
}

/// Adapter for a debugger kind.
pub fn adapter_for(kind: DebuggerKind) -> Box<dyn Adapter> {
    match kind {
        DebuggerKind::Gdb => Box::new(Gdb),
        DebuggerKind::Lldb => Box::new(Lldb::lldb()),
        DebuggerKind::Cjdb => Box::new(Lldb::cjdb()),
    }
}

/// File name component of a debugger-printed path.
pub(crate) fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_kinds() {
        for kind in [DebuggerKind::Gdb, DebuggerKind::Lldb, DebuggerKind::Cjdb] {
            let adapter = adapter_for(kind);
            assert_eq!(adapter.kind(), kind);
            assert!(adapter.prompt().ends_with(") "));
            assert_eq!(adapter.program(), kind.as_str());
        }
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/tmp/work/t.c"), "t.c");
        assert_eq!(basename("t.c"), "t.c");
    }
}
