use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Address, Image, ModelError, Trace};

// ============================================================================
// Debugger kinds
// ============================================================================

/// Debugger being tested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DebuggerKind {
    Gdb,
    Lldb,
    /// The Cangjie debugger, an lldb derivative.
    Cjdb,
}

impl DebuggerKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gdb => "gdb",
            Self::Lldb => "lldb",
            Self::Cjdb => "cjdb",
        }
    }

    /// Whether frames carry a column offset, making the `pos` view meaningful.
    pub const fn reports_offsets(self) -> bool {
        !matches!(self, Self::Gdb)
    }

    /// Compiler used with this debugger when none is given.
    pub const fn default_compiler(self) -> &'static str {
        match self {
            Self::Gdb => "gcc",
            Self::Lldb => "clang",
            Self::Cjdb => "cjc",
        }
    }
}

impl fmt::Display for DebuggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DebuggerKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gdb" => Ok(Self::Gdb),
            "lldb" => Ok(Self::Lldb),
            "cjdb" => Ok(Self::Cjdb),
            _ => Err(ModelError::InvalidDebugger(s.to_string())),
        }
    }
}

// ============================================================================
// Stepping and driving
// ============================================================================

/// How the debugger advances between recorded stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stepping {
    /// Source-line step (`stepl`).
    Line,
    /// Instruction step (`stepi`).
    Instruction,
    /// A fresh random choice between the two at every step.
    Random,
}

impl Stepping {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Line => "stepl",
            Self::Instruction => "stepi",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for Stepping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stepping {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stepl" | "line" => Ok(Self::Line),
            "stepi" | "instruction" => Ok(Self::Instruction),
            "random" => Ok(Self::Random),
            _ => Err(ModelError::InvalidStepping(s.to_string())),
        }
    }
}

/// How the debugger gets to the start point before collection begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DrivePolicy {
    /// Set a breakpoint on the start point and run to it.
    Break,
    /// Break at `main`, then step until the start point is reached.
    Step(Stepping),
}

impl fmt::Display for DrivePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Break => f.write_str("break"),
            Self::Step(stepping) => fmt::Display::fmt(stepping, f),
        }
    }
}

impl FromStr for DrivePolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "break" {
            Ok(Self::Break)
        } else {
            s.parse().map(Self::Step)
        }
    }
}

/// Where trace collection starts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StartPoint {
    /// The program entry, `main`.
    Entry,
    Address(Address),
    Line { file: String, line: u32 },
}

impl fmt::Display for StartPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => f.write_str("main"),
            Self::Address(addr) => fmt::Display::fmt(addr, f),
            Self::Line { file, line } => write!(f, "{file}:{line}"),
        }
    }
}

impl FromStr for StartPoint {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidStartPoint(s.to_string());
        if s == "main" {
            return Ok(Self::Entry);
        }
        if s.starts_with("0x") {
            return Address::parse(s).map(Self::Address).ok_or_else(invalid);
        }
        let (file, line) = s.rsplit_once(':').ok_or_else(invalid)?;
        let line = line.parse().map_err(|_| invalid())?;
        if file.is_empty() {
            return Err(invalid());
        }
        Ok(Self::Line {
            file: file.to_string(),
            line,
        })
    }
}

// ============================================================================
// Configurations
// ============================================================================

/// Optimization flag as passed to the compiler, e.g. `-O2`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptLevel(String);

impl OptLevel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OptLevel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("-O") {
            Some(level) if !level.is_empty() && level.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Ok(Self(s.to_string()))
            }
            _ => Err(ModelError::InvalidOptLevel(s.to_string())),
        }
    }
}

/// Configuration axis two traces may differ in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Stepping,
    Optimization,
}

/// Everything that determines one trace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Configuration {
    pub compiler: String,
    pub optimization: OptLevel,
    pub debugger: DebuggerKind,
    pub stepping: Stepping,
    pub drive: DrivePolicy,
    pub start: StartPoint,
}

impl Configuration {
    /// Line stepping from `main`, reached by breakpoint.
    pub fn new(compiler: impl Into<String>, optimization: OptLevel, debugger: DebuggerKind) -> Self {
        Self {
            compiler: compiler.into(),
            optimization,
            debugger,
            stepping: Stepping::Line,
            drive: DrivePolicy::Break,
            start: StartPoint::Entry,
        }
    }

    #[must_use]
    pub fn with_stepping(mut self, stepping: Stepping) -> Self {
        self.stepping = stepping;
        self
    }

    #[must_use]
    pub fn with_drive(mut self, drive: DrivePolicy) -> Self {
        self.drive = drive;
        self
    }

    #[must_use]
    pub fn with_start(mut self, start: StartPoint) -> Self {
        self.start = start;
        self
    }

    #[must_use]
    pub fn with_optimization(mut self, optimization: OptLevel) -> Self {
        self.optimization = optimization;
        self
    }

    /// Whether `self` and `other` differ in `axis` and agree on everything else.
    pub fn differs_only_in(&self, other: &Self, axis: Axis) -> bool {
        let same_rest = self.compiler == other.compiler
            && self.debugger == other.debugger
            && self.drive == other.drive
            && self.start == other.start;
        match axis {
            Axis::Stepping => {
                same_rest && self.optimization == other.optimization && self.stepping != other.stepping
            }
            Axis::Optimization => {
                same_rest && self.stepping == other.stepping && self.optimization != other.optimization
            }
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {}, {})",
            self.compiler, self.optimization, self.debugger, self.stepping, self.drive, self.start
        )
    }
}

/// All traces and images collected for one source file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTraces {
    pub traces: BTreeMap<Configuration, Trace>,
    pub images: BTreeMap<OptLevel, Image>,
}

impl FileTraces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&self, config: &Configuration) -> Option<&Trace> {
        self.traces.get(config)
    }

    pub fn image(&self, opt: &OptLevel) -> Option<&Image> {
        self.images.get(opt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(s: &str) -> OptLevel {
        s.parse().unwrap()
    }

    #[test]
    fn test_start_point_parse() {
        assert_eq!("main".parse::<StartPoint>().unwrap(), StartPoint::Entry);
        assert_eq!(
            "0x401136".parse::<StartPoint>().unwrap(),
            StartPoint::Address(Address(0x0040_1136))
        );
        assert_eq!(
            "a.c:12".parse::<StartPoint>().unwrap(),
            StartPoint::Line {
                file: "a.c".into(),
                line: 12
            }
        );
        assert!("a.c".parse::<StartPoint>().is_err());
        assert!(":3".parse::<StartPoint>().is_err());
    }

    #[test]
    fn test_start_point_display_round_trips() {
        for text in ["main", "0x10", "dir/a.c:7"] {
            assert_eq!(text.parse::<StartPoint>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_opt_level_parse() {
        assert_eq!(opt("-Og").as_str(), "-Og");
        assert!("O2".parse::<OptLevel>().is_err());
        assert!("-O".parse::<OptLevel>().is_err());
    }

    #[test]
    fn test_differs_only_in() {
        let base = Configuration::new("gcc", opt("-O0"), DebuggerKind::Gdb);
        let stepi = base.clone().with_stepping(Stepping::Instruction);
        let o2 = base.clone().with_optimization(opt("-O2"));

        assert!(base.differs_only_in(&stepi, Axis::Stepping));
        assert!(!base.differs_only_in(&stepi, Axis::Optimization));
        assert!(base.differs_only_in(&o2, Axis::Optimization));
        assert!(!o2.differs_only_in(&stepi, Axis::Stepping));
        assert!(!base.differs_only_in(&base, Axis::Stepping));
    }

    #[test]
    fn test_drive_policy_parse() {
        assert_eq!("break".parse::<DrivePolicy>().unwrap(), DrivePolicy::Break);
        assert_eq!(
            "stepi".parse::<DrivePolicy>().unwrap(),
            DrivePolicy::Step(Stepping::Instruction)
        );
        assert!("jump".parse::<DrivePolicy>().is_err());
    }
}
