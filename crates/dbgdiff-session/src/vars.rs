//! Variable dumps into flat snapshots.
//!
//! Debuggers print aggregates over several lines:
//!
//! ```text
//! p = {
//!   x = 1
//!   y = 2
//! }
//! ```
//!
//! Fields are flattened into the parent as `p.x` and `p.y`. An aggregate
//! introduced by a value that only ends in `{` (e.g. `size=2 {`) is kept as
//! one reconstructed string instead.

use dbgdiff_model::VarSnapshot;

use crate::{Result, Session};

/// Parse variables from `cursor` until the closing line of the current
/// aggregate, or until input runs out.
///
/// Nested aggregates advance the same cursor, so on return it sits just past
/// the consumed lines.
pub fn parse_snapshot<'a, I>(cursor: &mut I) -> VarSnapshot
where
    I: Iterator<Item = &'a str>,
{
    let mut snapshot = VarSnapshot::new();
    while let Some(line) = cursor.next() {
        if is_closing(line) {
            break;
        }
        let Some((name, value)) = line.split_once(" = ") else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());

        if value.starts_with('{') && !is_balanced(value) {
            let fields = parse_snapshot(cursor);
            for (field, field_value) in fields.iter() {
                snapshot.insert(format!("{name}.{field}"), field_value);
            }
        } else if value.ends_with('{') {
            let body = dump_aggregate(cursor);
            snapshot.insert(name, close_aggregate(value, &body));
        } else {
            snapshot.insert(name, value);
        }
    }
    snapshot
}

/// Text of an aggregate body up to its closing line, children joined by `, `.
fn dump_aggregate<'a, I>(cursor: &mut I) -> String
where
    I: Iterator<Item = &'a str>,
{
    let mut parts = Vec::new();
    while let Some(line) = cursor.next() {
        let line = line.trim();
        if is_closing(line) {
            break;
        }
        if line.ends_with('{') {
            let body = dump_aggregate(cursor);
            parts.push(close_aggregate(line, &body));
        } else {
            parts.push(line.trim_end_matches(',').to_string());
        }
    }
    parts.join(", ")
}

fn close_aggregate(open: &str, body: &str) -> String {
    if body.is_empty() {
        format!("{open}}}")
    } else {
        format!("{open} {body} }}")
    }
}

fn is_closing(line: &str) -> bool {
    line.trim().trim_end_matches(',') == "}"
}

fn is_balanced(value: &str) -> bool {
    value.matches('{').count() == value.matches('}').count()
}

/// Variables visible in the current frame.
pub fn frame_variables(session: &mut Session) -> Result<VarSnapshot> {
    let mut output = String::new();
    for command in session.adapter().variable_commands() {
        output.push_str(&session.send(command)?);
        output.push('\n');
    }
    Ok(parse_snapshot(&mut output.lines()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> Vec<(String, String)> {
        parse_snapshot(&mut lines.iter().copied())
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_flat_dump() {
        assert_eq!(parse(&["x = 1", "y = 2", "}"]), pairs(&[("x", "1"), ("y", "2")]));
    }

    #[test]
    fn test_nested_fields_are_flattened() {
        let lines = ["p = {", "x = 1", "y = 2", "}", "q = 3", "}"];
        assert_eq!(
            parse(&lines),
            pairs(&[("p.x", "1"), ("p.y", "2"), ("q", "3")])
        );
    }

    #[test]
    fn test_lines_without_assignment_are_skipped() {
        let lines = ["No arguments.", "(int) x = 5", "warning: something"];
        assert_eq!(parse(&lines), pairs(&[("(int) x", "5")]));
    }

    #[test]
    fn test_single_line_aggregate_is_a_value() {
        let lines = ["p = {x = 1, y = 2}", "n = 0"];
        assert_eq!(parse(&lines), pairs(&[("n", "0"), ("p", "{x = 1, y = 2}")]));
    }

    #[test]
    fn test_trailing_brace_value_is_reconstructed() {
        let lines = [
            "(std::vector<int>) v = size=2 {",
            "  [0] = 1",
            "  [1] = 2",
            "}",
            "(int) n = 4",
        ];
        assert_eq!(
            parse(&lines),
            pairs(&[("(int) n", "4"), ("(std::vector<int>) v", "size=2 { [0] = 1, [1] = 2 }")])
        );
    }

    #[test]
    fn test_cursor_resumes_after_closing_line() {
        let lines = ["a = 1", "}", "b = 2"];
        let mut cursor = lines.iter().copied();
        let first = parse_snapshot(&mut cursor);
        let second = parse_snapshot(&mut cursor);
        assert_eq!(first.get("a"), Some("1"));
        assert_eq!(first.get("b"), None);
        assert_eq!(second.get("b"), Some("2"));
    }
}
