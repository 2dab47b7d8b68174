use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::nested::Nested;
use crate::{Address, Location, PointKey, VarSnapshot, View};

/// One recorded stop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub location: Location,
    pub variables: VarSnapshot,
}

/// Everything one debugger run observed in user code.
///
/// Stored flat: the visit log plus the first-occurrence order of full tuples.
/// Per-view tables are projections of the log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    order: Vec<Location>,
    visits: Vec<Visit>,
}

impl Trace {
    /// Full tuples in the order they were first seen.
    pub fn order(&self) -> &[Location] {
        &self.order
    }

    /// Every recorded stop, repeats included.
    pub fn visits(&self) -> &[Visit] {
        &self.visits
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    /// First-occurrence order projected onto `view`, deduplicated.
    pub fn order_in(&self, view: View) -> Vec<PointKey> {
        let mut seen = FxHashSet::default();
        self.order
            .iter()
            .map(|loc| loc.project(view))
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    /// Visit count per point.
    pub fn hits(&self, view: View) -> BTreeMap<PointKey, u64> {
        let mut hits = BTreeMap::new();
        for visit in &self.visits {
            *hits.entry(visit.location.project(view)).or_insert(0) += 1;
        }
        hits
    }

    /// Snapshots observed at each point, in visit order.
    pub fn variables(&self, view: View) -> BTreeMap<PointKey, Vec<&VarSnapshot>> {
        let mut vars: BTreeMap<PointKey, Vec<&VarSnapshot>> = BTreeMap::new();
        for visit in &self.visits {
            vars.entry(visit.location.project(view))
                .or_default()
                .push(&visit.variables);
        }
        vars
    }

    /// Hit counts nested as `file → line → offset → address`.
    pub fn hit_tree(&self) -> Nested<HitSegment, u64> {
        let mut tree = Nested::new();
        for visit in &self.visits {
            *tree.entry(HitSegment::path(&visit.location)) += 1;
        }
        tree
    }
}

/// One level of the nested hit table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HitSegment {
    File(Option<String>),
    Line(Option<u32>),
    Offset(Option<u32>),
    Address(Address),
}

impl HitSegment {
    pub fn path(loc: &Location) -> [Self; 4] {
        [
            Self::File(loc.file.clone()),
            Self::Line(loc.line),
            Self::Offset(loc.offset),
            Self::Address(loc.address),
        ]
    }
}

impl fmt::Display for HitSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(Some(file)) => f.write_str(file),
            Self::Line(Some(n)) | Self::Offset(Some(n)) => write!(f, "{n}"),
            Self::File(None) | Self::Line(None) | Self::Offset(None) => f.write_str("None"),
            Self::Address(address) => fmt::Display::fmt(address, f),
        }
    }
}

/// Accumulates visits while a debugger is being stepped.
#[derive(Debug, Default)]
pub struct TraceBuilder {
    seen: FxHashSet<Location>,
    trace: Trace,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, location: Location, variables: VarSnapshot) {
        if self.seen.insert(location.clone()) {
            self.trace.order.push(location.clone());
        }
        self.trace.visits.push(Visit {
            location,
            variables,
        });
    }

    pub fn len(&self) -> usize {
        self.trace.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.visits.is_empty()
    }

    #[must_use]
    pub fn finish(self) -> Trace {
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nested;

    fn at(line: u32, addr: u64) -> Location {
        Location::new(Some("t.c".into()), Some(line), None, Address(addr))
    }

    fn vars(x: &str) -> VarSnapshot {
        [("x", x)].into_iter().collect()
    }

    fn sample() -> Trace {
        let mut builder = TraceBuilder::new();
        builder.record(at(3, 0x10), vars("1"));
        builder.record(at(3, 0x14), vars("2"));
        builder.record(at(4, 0x18), vars("3"));
        builder.record(at(3, 0x10), vars("4"));
        builder.finish()
    }

    #[test]
    fn test_order_has_no_duplicates() {
        let trace = sample();
        assert_eq!(trace.order(), &[at(3, 0x10), at(3, 0x14), at(4, 0x18)]);
        assert_eq!(trace.visits().len(), 4);
    }

    #[test]
    fn test_view_tables_are_projections_of_order() {
        let trace = sample();
        for view in View::ALL {
            let projected: Vec<_> = trace.order().iter().map(|l| l.project(view)).collect();
            for key in trace.hits(view).keys() {
                assert!(projected.contains(key), "{key} not in order for {view}");
            }
        }
    }

    #[test]
    fn test_hits_and_order_per_view() {
        let trace = sample();
        let loc = trace.hits(View::Loc);
        assert_eq!(loc[&at(3, 0).project(View::Loc)], 3);
        assert_eq!(loc[&at(4, 0).project(View::Loc)], 1);
        assert_eq!(trace.order_in(View::Loc).len(), 2);
        assert_eq!(trace.hits(View::Adr)[&PointKey::Adr(Address(0x10))], 2);
    }

    #[test]
    fn test_variable_history_in_visit_order() {
        let trace = sample();
        let history = trace.variables(View::Loc);
        let at_three: Vec<_> = history[&at(3, 0).project(View::Loc)]
            .iter()
            .map(|s| s.get("x").unwrap())
            .collect();
        assert_eq!(at_three, ["1", "2", "4"]);
    }

    #[test]
    fn test_hit_tree_matches_flat_counts() {
        let trace = sample();
        let tree = trace.hit_tree();
        let common = nested::common_prefix(&tree, &tree, 4);
        assert_eq!(common.len(), 3);
        let total: u64 = common.iter().map(|(_, x, _)| **x).sum();
        assert_eq!(total, 4);
    }
}
