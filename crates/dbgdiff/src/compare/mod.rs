//! Differential comparison of traces.
//!
//! Two traces of the same file are compared when their configurations differ
//! in exactly one [`Axis`]. Stepping comparisons run four checks per view;
//! optimization comparisons only compare variable values. Every difference
//! found is a [`Discrepancy`], which is data, not an error.

mod checks;
#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use dbgdiff_model::nested::{common_addresses, common_prefix};
use dbgdiff_model::{
    Axis, Configuration, DebuggerKind, FileTraces, HitSegment, Image, OptLevel, PointKey, Stepping, Trace,
    View,
};
use thiserror::Error;

/// Comparison errors.
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("{a} and {b} do not differ in {axis:?} alone")]
    Mismatch {
        a: Box<Configuration>,
        b: Box<Configuration>,
        axis: Axis,
    },
    #[error("no trace for {0}")]
    MissingTrace(Box<Configuration>),
}

// ============================================================================
// Discrepancy records
// ============================================================================

/// Which pair of configurations produced a discrepancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Step,
    Optimization,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Optimization => "optimization",
        }
    }

    const fn for_axis(axis: Axis) -> Self {
        match axis {
            Axis::Stepping => Self::Step,
            Axis::Optimization => Self::Optimization,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Check {
    Existence,
    Order,
    Frequency,
    Variable,
}

impl Check {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Existence => "Exist",
            Self::Order => "Order",
            Self::Frequency => "Frequency",
            Self::Variable => "Var",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a pair a point was seen on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    LeftOnly,
    RightOnly,
}

/// What differed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscrepancyKind {
    /// A point visited on one side only.
    Missing {
        key: PointKey,
        side: Side,
        text: Option<String>,
    },
    /// The same points visited in a different order.
    Order { left: Vec<PointKey>, right: Vec<PointKey> },
    /// A point hit more often on the left than on the right.
    Frequency {
        key: PointKey,
        text: Option<String>,
        left: u64,
        right: u64,
    },
    /// A variable shown with different values at the same point.
    Value {
        key: PointKey,
        name: String,
        left: String,
        right: String,
        text: Option<String>,
    },
}

/// One difference between two traces of the same file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discrepancy {
    pub method: Method,
    pub check: Check,
    pub view: View,
    pub file: String,
    pub left: Configuration,
    pub right: Configuration,
    pub kind: DiscrepancyKind,
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, left [{}], right [{}], ", self.file, self.left, self.right)?;
        match &self.kind {
            DiscrepancyKind::Missing { key, side, text: t } => {
                let (seen, unseen) = match side {
                    Side::LeftOnly => (self.left.stepping, self.right.stepping),
                    Side::RightOnly => (self.right.stepping, self.left.stepping),
                };
                write!(f, "[in {seen} not in {unseen}], key {key}, text {}", or_empty(t.as_deref()))
            }
            DiscrepancyKind::Order { left, right } => {
                write!(f, "left order {}, right order {}", join(left), join(right))
            }
            DiscrepancyKind::Frequency {
                key,
                text: t,
                left,
                right,
            } => write!(f, "key {key}, text {}, hits(left) {left}, hits(right) {right}", or_empty(t.as_deref())),
            DiscrepancyKind::Value {
                key,
                name,
                left,
                right,
                text: t,
            } => write!(
                f,
                "key {key}, var {name}, left value {left}, right value {right}, text {}",
                or_empty(t.as_deref())
            ),
        }
    }
}

fn or_empty(text: Option<&str>) -> &str {
    text.unwrap_or_default()
}

fn join(keys: &[PointKey]) -> String {
    let parts: Vec<String> = keys.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

// ============================================================================
// Engine
// ============================================================================

/// Lines of the file under test, for annotating discrepancies.
#[derive(Debug, Clone)]
pub struct SourceText {
    name: String,
    label: String,
    lines: Vec<String>,
}

impl SourceText {
    /// `name` is the basename frames report for this file.
    pub fn new(name: impl Into<String>, text: &str) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Read `path`; discrepancies are labelled with the full path.
    pub fn read(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut text = Self::new(name, &String::from_utf8_lossy(&bytes));
        text.label = path.display().to_string();
        Ok(text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// How discrepancies name the file.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Trimmed text of a 1-based line.
    pub fn line(&self, number: u32) -> Option<&str> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.lines.get(index).map(|line| line.trim())
    }

    /// What to print next to a point: its source line when it is in this
    /// file, otherwise the file it is in.
    fn annotate(&self, key: &PointKey) -> Option<String> {
        let file = key.file()?;
        if file == self.name {
            key.line().and_then(|line| self.line(line)).map(str::to_string)
        } else {
            Some(file.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompareConfig {
    /// Only compare points that appear in the static line table.
    pub validate: bool,
}

impl CompareConfig {
    #[must_use]
    pub const fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

/// Compares the traces of one source file.
pub struct Engine {
    source: SourceText,
    config: CompareConfig,
}

/// Two traces being compared, with the line-stepped side on the left.
pub(crate) struct Pair<'t> {
    pub left: &'t Trace,
    pub right: &'t Trace,
    pub left_config: &'t Configuration,
    pub right_config: &'t Configuration,
    pub method: Method,
    pub images: Vec<&'t Image>,
}

impl Engine {
    pub const fn new(source: SourceText, config: CompareConfig) -> Self {
        Self { source, config }
    }

    pub const fn source(&self) -> &SourceText {
        &self.source
    }

    /// Compare the traces of `a` and `b`, which must differ in `axis` alone.
    pub fn compare_pair(
        &self,
        traces: &FileTraces,
        a: &Configuration,
        b: &Configuration,
        axis: Axis,
    ) -> Result<Vec<Discrepancy>, CompareError> {
        if !a.differs_only_in(b, axis) {
            return Err(CompareError::Mismatch {
                a: Box::new(a.clone()),
                b: Box::new(b.clone()),
                axis,
            });
        }
        let (a, b) = if axis == Axis::Stepping && b.stepping == Stepping::Line {
            (b, a)
        } else {
            (a, b)
        };
        let trace = |config: &Configuration| {
            traces
                .trace(config)
                .ok_or_else(|| CompareError::MissingTrace(Box::new(config.clone())))
        };
        let pair = Pair {
            left: trace(a)?,
            right: trace(b)?,
            left_config: a,
            right_config: b,
            method: Method::for_axis(axis),
            images: [&a.optimization, &b.optimization]
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .filter_map(|opt| traces.image(opt))
                .collect(),
        };

        let mut found = Vec::new();
        for view in views_for(a.debugger) {
            let allowed = self.allowed_points(&pair, view);
            let allowed = allowed.as_ref();
            if axis == Axis::Stepping {
                found.extend(checks::existence(self, &pair, view, allowed));
                found.extend(checks::order(self, &pair, view, allowed));
                found.extend(checks::frequency(self, &pair, view));
            }
            found.extend(checks::variables(self, &pair, view, allowed));
        }
        Ok(found)
    }

    /// The stepping comparison at every level, then the variable comparison
    /// between every two levels for both stepping strategies.
    pub fn compare_all(
        &self,
        traces: &FileTraces,
        compiler: &str,
        debugger: DebuggerKind,
        levels: &[OptLevel],
    ) -> Result<Vec<Discrepancy>, CompareError> {
        let mut found = Vec::new();
        for opt in levels {
            let line = Configuration::new(compiler, opt.clone(), debugger);
            let instruction = line.clone().with_stepping(Stepping::Instruction);
            found.extend(self.compare_pair(traces, &line, &instruction, Axis::Stepping)?);
        }
        for (i, first) in levels.iter().enumerate() {
            for second in &levels[i + 1..] {
                for stepping in [Stepping::Line, Stepping::Instruction] {
                    let a = Configuration::new(compiler, first.clone(), debugger).with_stepping(stepping);
                    let b = a.clone().with_optimization(second.clone());
                    found.extend(self.compare_pair(traces, &a, &b, Axis::Optimization)?);
                }
            }
        }
        Ok(found)
    }

    /// Points every image of the pair has a line-table row for, when validating.
    fn allowed_points(&self, pair: &Pair<'_>, view: View) -> Option<BTreeSet<PointKey>> {
        if !self.config.validate {
            return None;
        }
        let mut images = pair.images.iter().map(|image| image.project(view));
        let first = images.next().unwrap_or_default();
        Some(images.fold(first, |acc, next| acc.intersection(&next).cloned().collect()))
    }
}

/// Views worth comparing for a debugger; `pos` needs column offsets.
pub fn views_for(debugger: DebuggerKind) -> impl Iterator<Item = View> {
    View::ALL
        .into_iter()
        .filter(move |view| *view != View::Pos || debugger.reports_offsets())
}

// ============================================================================
// Common-point traversal
// ============================================================================

/// A point both traces visited, with each side's hit count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommonPoint {
    pub path: Vec<HitSegment>,
    pub left: u64,
    pub right: u64,
}

/// Points shared by two traces at the granularity of `view`.
///
/// Above the address level a count is the first leaf under the shared prefix,
/// not a sum.
pub fn common_points(a: &Trace, b: &Trace, view: View) -> Vec<CommonPoint> {
    let (left, right) = (a.hit_tree(), b.hit_tree());
    match view.depth() {
        None => common_addresses(&left, &right)
            .into_iter()
            .map(|(key, x, y)| CommonPoint {
                path: vec![key.clone()],
                left: *x,
                right: *y,
            })
            .collect(),
        Some(depth) => common_prefix(&left, &right, depth)
            .into_iter()
            .map(|(path, x, y)| CommonPoint {
                path: path.into_iter().cloned().collect(),
                left: *x,
                right: *y,
            })
            .collect(),
    }
}
