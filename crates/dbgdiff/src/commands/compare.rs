//! The compare command: re-run the comparison over cached traces.

use std::collections::BTreeMap;

use dbgdiff::pipeline::{self, RunConfig};
use dbgdiff::report::ReportWriter;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal;

/// Handle the `compare` command.
pub fn cmd_compare(config: &RunConfig) -> i32 {
    let Some(traces) = super::cached_traces(config) else {
        return EXIT_FAILURE;
    };
    let found = match pipeline::compare_file(&config.source, &traces, config) {
        Ok(found) => found,
        Err(e) => {
            terminal::error(&format!("comparison failed: {e}"));
            return EXIT_FAILURE;
        }
    };

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for discrepancy in &found {
        let key = format!(
            "{}/{}-{}",
            discrepancy.method, discrepancy.check, discrepancy.view
        );
        *counts.entry(key).or_default() += 1;
    }

    if let Err(e) = ReportWriter::new(&config.out_dir).write(&found) {
        terminal::error(&format!("cannot write reports: {e}"));
        return EXIT_FAILURE;
    }
    terminal::success(&format!("{} discrepancies", found.len()));
    for (key, count) in &counts {
        eprintln!("  {key}: {count}");
    }
    terminal::path_output(&config.out_dir);
    EXIT_SUCCESS
}
