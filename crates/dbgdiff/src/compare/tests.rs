use dbgdiff_model::{
    Address, Axis, Configuration, DebuggerKind, FileTraces, HitSegment, Image, Location, OptLevel, Stepping,
    Trace, TraceBuilder, VarSnapshot, View,
};

use super::*;

const SOURCE: &str = "int main(void)\n{\n  int x = 1;\n  x++;\n  return x;\n}\n";

fn engine() -> Engine {
    Engine::new(SourceText::new("t.c", SOURCE), CompareConfig::default())
}

fn loc(line: u32, address: u64) -> Location {
    Location::new(Some("t.c".into()), Some(line), None, Address(address))
}

fn vars(pairs: &[(&str, &str)]) -> VarSnapshot {
    pairs.iter().copied().collect()
}

fn trace(stops: &[(Location, VarSnapshot)]) -> Trace {
    let mut builder = TraceBuilder::new();
    for (location, snapshot) in stops {
        builder.record(location.clone(), snapshot.clone());
    }
    builder.finish()
}

fn opt(level: &str) -> OptLevel {
    level.parse().unwrap()
}

fn config(level: &str, stepping: Stepping) -> Configuration {
    Configuration::new("gcc", opt(level), DebuggerKind::Gdb).with_stepping(stepping)
}

fn traces(entries: Vec<(Configuration, Trace)>) -> FileTraces {
    let mut traces = FileTraces::new();
    traces.traces.extend(entries);
    traces
}

fn stepping_pair(line: Trace, instruction: Trace) -> Vec<Discrepancy> {
    let traces = traces(vec![
        (config("-O0", Stepping::Line), line),
        (config("-O0", Stepping::Instruction), instruction),
    ]);
    engine()
        .compare_pair(
            &traces,
            &config("-O0", Stepping::Line),
            &config("-O0", Stepping::Instruction),
            Axis::Stepping,
        )
        .unwrap()
}

fn only(found: &[Discrepancy], check: Check, view: View) -> Vec<&Discrepancy> {
    found
        .iter()
        .filter(|d| d.check == check && d.view == view)
        .collect()
}

#[test]
fn test_existence_empty_when_sets_match() {
    let empty = VarSnapshot::new();
    let line = trace(&[(loc(3, 0x10), empty.clone()), (loc(4, 0x18), empty.clone())]);
    let instruction = trace(&[(loc(4, 0x18), empty.clone()), (loc(3, 0x10), empty)]);
    let found = stepping_pair(line, instruction);
    assert!(only(&found, Check::Existence, View::Loc).is_empty());
    // Same points, different first-visit order.
    assert_eq!(only(&found, Check::Order, View::Loc).len(), 1);
}

#[test]
fn test_existence_reports_both_sides() {
    let empty = VarSnapshot::new();
    let line = trace(&[(loc(3, 0x10), empty.clone()), (loc(4, 0x18), empty.clone())]);
    let instruction = trace(&[(loc(3, 0x10), empty.clone()), (loc(5, 0x20), empty)]);
    let found = stepping_pair(line, instruction);

    let loc_view = only(&found, Check::Existence, View::Loc);
    assert_eq!(loc_view.len(), 2);
    assert!(matches!(
        &loc_view[0].kind,
        DiscrepancyKind::Missing { side: Side::LeftOnly, text: Some(text), .. } if text == "x++;"
    ));
    assert!(matches!(
        &loc_view[1].kind,
        DiscrepancyKind::Missing { side: Side::RightOnly, .. }
    ));

    // Address view reports only what the line-stepped side saw alone.
    let adr_view = only(&found, Check::Existence, View::Adr);
    assert_eq!(adr_view.len(), 1);
}

#[test]
fn test_existence_skips_brace_lines() {
    let empty = VarSnapshot::new();
    let line = trace(&[(loc(2, 0x8), empty.clone()), (loc(3, 0x10), empty.clone())]);
    let instruction = trace(&[(loc(3, 0x10), empty)]);
    let found = stepping_pair(line, instruction);
    assert!(only(&found, Check::Existence, View::Loc).is_empty());
}

#[test]
fn test_frequency_is_one_directional() {
    let empty = VarSnapshot::new();
    let thrice = trace(&[
        (loc(4, 0x18), empty.clone()),
        (loc(4, 0x18), empty.clone()),
        (loc(4, 0x18), empty.clone()),
    ]);
    let once = trace(&[(loc(4, 0x18), empty)]);

    let found = stepping_pair(thrice.clone(), once.clone());
    let freq = only(&found, Check::Frequency, View::Loc);
    assert_eq!(freq.len(), 1);
    assert!(matches!(
        freq[0].kind,
        DiscrepancyKind::Frequency { left: 3, right: 1, .. }
    ));

    let found = stepping_pair(once, thrice);
    assert!(only(&found, Check::Frequency, View::Loc).is_empty());
}

#[test]
fn test_variable_values_skip_unavailable() {
    let line = trace(&[(loc(4, 0x18), vars(&[("x", "1"), ("y", "<optimized out>"), ("z", "5")]))]);
    let instruction = trace(&[(loc(4, 0x18), vars(&[("x", "2"), ("y", "7"), ("z", "5")]))]);
    let found = stepping_pair(line, instruction);

    let values = only(&found, Check::Variable, View::Loc);
    assert_eq!(values.len(), 1);
    assert!(matches!(
        &values[0].kind,
        DiscrepancyKind::Value { name, left, right, .. } if name == "x" && left == "1" && right == "2"
    ));
}

#[test]
fn test_gdb_skips_pos_view() {
    let line = trace(&[(loc(3, 0x10), vars(&[("x", "1")]))]);
    let instruction = trace(&[(loc(3, 0x10), vars(&[("x", "2")]))]);
    let found = stepping_pair(line, instruction);
    assert!(found.iter().all(|d| d.view != View::Pos));
    assert_eq!(found.len(), 3);
}

#[test]
fn test_line_side_is_left() {
    let empty = VarSnapshot::new();
    let traces = traces(vec![
        (config("-O0", Stepping::Line), trace(&[(loc(3, 0x10), empty.clone())])),
        (config("-O0", Stepping::Instruction), trace(&[(loc(4, 0x18), empty)])),
    ]);
    let found = engine()
        .compare_pair(
            &traces,
            &config("-O0", Stepping::Instruction),
            &config("-O0", Stepping::Line),
            Axis::Stepping,
        )
        .unwrap();
    assert!(found.iter().all(|d| d.left.stepping == Stepping::Line));
}

#[test]
fn test_validate_filters_by_line_table() {
    let empty = VarSnapshot::new();
    let mut traces = traces(vec![
        (
            config("-O0", Stepping::Line),
            trace(&[(loc(3, 0x10), empty.clone()), (loc(4, 0x18), empty.clone())]),
        ),
        (config("-O0", Stepping::Instruction), trace(&[(loc(3, 0x10), empty)])),
    ]);
    traces.images.insert(opt("-O0"), std::iter::once(loc(3, 0x10)).collect::<Image>());

    let engine = Engine::new(
        SourceText::new("t.c", SOURCE),
        CompareConfig::default().with_validate(true),
    );
    let found = engine
        .compare_pair(
            &traces,
            &config("-O0", Stepping::Line),
            &config("-O0", Stepping::Instruction),
            Axis::Stepping,
        )
        .unwrap();
    assert!(only(&found, Check::Existence, View::Loc).is_empty());
}

#[test]
fn test_optimization_axis_compares_values_only() {
    let o0 = trace(&[(loc(3, 0x10), vars(&[("x", "1")])), (loc(4, 0x18), VarSnapshot::new())]);
    let o2 = trace(&[(loc(3, 0x10), vars(&[("x", "9")]))]);
    let traces = traces(vec![
        (config("-O0", Stepping::Line), o0),
        (config("-O2", Stepping::Line), o2),
    ]);
    let found = engine()
        .compare_pair(
            &traces,
            &config("-O0", Stepping::Line),
            &config("-O2", Stepping::Line),
            Axis::Optimization,
        )
        .unwrap();
    assert!(!found.is_empty());
    assert!(found.iter().all(|d| d.check == Check::Variable && d.method == Method::Optimization));
}

#[test]
fn test_mismatched_pair_is_rejected() {
    let traces = FileTraces::new();
    let result = engine().compare_pair(
        &traces,
        &config("-O0", Stepping::Line),
        &config("-O2", Stepping::Instruction),
        Axis::Stepping,
    );
    assert!(matches!(result, Err(CompareError::Mismatch { .. })));

    let result = engine().compare_pair(
        &traces,
        &config("-O0", Stepping::Line),
        &config("-O0", Stepping::Instruction),
        Axis::Stepping,
    );
    assert!(matches!(result, Err(CompareError::MissingTrace(_))));
}

#[test]
fn test_compare_all_needs_every_level() {
    let empty = VarSnapshot::new();
    let mut entries = Vec::new();
    for level in ["-O0", "-O2"] {
        for stepping in [Stepping::Line, Stepping::Instruction] {
            entries.push((config(level, stepping), trace(&[(loc(3, 0x10), empty.clone())])));
        }
    }
    let traces = traces(entries);
    let found = engine()
        .compare_all(&traces, "gcc", DebuggerKind::Gdb, &[opt("-O0"), opt("-O2")])
        .unwrap();
    assert!(found.is_empty());

    let result = engine().compare_all(&traces, "gcc", DebuggerKind::Gdb, &[opt("-O0"), opt("-O1")]);
    assert!(matches!(result, Err(CompareError::MissingTrace(_))));
}

#[test]
fn test_common_points_by_line() {
    let empty = VarSnapshot::new();
    let a = trace(&[(loc(3, 0x10), empty.clone()), (loc(4, 0x18), empty.clone())]);
    let b = trace(&[(loc(3, 0x12), empty.clone()), (loc(3, 0x12), empty)]);

    let by_line = common_points(&a, &b, View::Loc);
    assert_eq!(by_line.len(), 1);
    assert_eq!(
        by_line[0].path,
        vec![HitSegment::File(Some("t.c".into())), HitSegment::Line(Some(3))]
    );
    assert_eq!((by_line[0].left, by_line[0].right), (1, 2));

    assert!(common_points(&a, &b, View::Adr).is_empty());
}

#[test]
fn test_source_text_lines() {
    let text = SourceText::new("t.c", SOURCE);
    assert_eq!(text.line(3), Some("int x = 1;"));
    assert_eq!(text.line(0), None);
    assert_eq!(text.line(99), None);
}
