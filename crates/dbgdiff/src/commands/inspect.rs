//! The inspect command: shared points of two cached traces.

use dbgdiff::compare::common_points;
use dbgdiff::pipeline::RunConfig;
use dbgdiff::{Configuration, FileTraces, OptLevel, StartPoint, Stepping, View};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal;

/// Handle the `inspect` command.
///
/// Prints one tab-separated row per shared point: the point, then the hit
/// count on each side.
pub fn cmd_inspect(
    config: &RunConfig,
    traces: &FileTraces,
    opt: &OptLevel,
    against: Option<&OptLevel>,
    view: View,
    differing: bool,
) -> i32 {
    let left = Configuration::new(config.compiler.name(), opt.clone(), config.debugger);
    let right = match against {
        Some(other) => left.clone().with_optimization(other.clone()),
        None => left.clone().with_stepping(Stepping::Instruction),
    };
    let (Some(a), Some(b)) = (traces.trace(&left), traces.trace(&right)) else {
        terminal::error(&format!("no cached trace for {left} and {right}"));
        return EXIT_FAILURE;
    };

    terminal::header(&format!("{left} vs {right}"));
    for (side, trace) in [(&left, a), (&right, b)] {
        eprintln!(
            "  {side}: {} stops, {} distinct points at {view}",
            trace.visits().len(),
            trace.hits(view).len()
        );
    }

    let points = common_points(a, b, view);
    let mut unequal = 0;
    for point in &points {
        if point.left != point.right {
            unequal += 1;
        } else if differing {
            continue;
        }
        let path: Vec<String> = point.path.iter().map(ToString::to_string).collect();
        println!("{}\t{}\t{}", path.join(":"), point.left, point.right);
    }
    terminal::info(&format!(
        "{} shared points, {unequal} with different hit counts",
        points.len()
    ));

    let start_runs = traces
        .traces
        .keys()
        .filter(|config| config.start != StartPoint::Entry)
        .count();
    if start_runs > 0 {
        terminal::info(&format!("{start_runs} start-point traces cached"));
    }
    EXIT_SUCCESS
}
