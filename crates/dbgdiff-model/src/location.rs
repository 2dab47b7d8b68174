use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Address, ModelError};

/// A program point: `(file, line, offset, address)`.
///
/// `file` is a source basename, or `None` while execution is inside library
/// or runtime code with no debug info for the file under test.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub offset: Option<u32>,
    pub address: Address,
}

impl Location {
    pub fn new(file: Option<String>, line: Option<u32>, offset: Option<u32>, address: Address) -> Self {
        Self {
            file,
            line,
            offset,
            address,
        }
    }

    /// Whether this point lies in the file under test.
    pub const fn is_user_code(&self) -> bool {
        self.file.is_some()
    }

    /// Project onto a view.
    pub fn project(&self, view: View) -> PointKey {
        match view {
            View::Adr => PointKey::Adr(self.address),
            View::Loc => PointKey::Loc {
                file: self.file.clone(),
                line: self.line,
            },
            View::Pos => PointKey::Pos {
                file: self.file.clone(),
                line: self.line,
                offset: self.offset,
            },
            View::All => PointKey::All(self.clone()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            OptField(self.file.as_deref()),
            OptField(self.line),
            OptField(self.offset),
            self.address
        )
    }
}

struct OptField<T>(Option<T>);

impl<T: fmt::Display> fmt::Display for OptField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("None"),
        }
    }
}

/// Comparison granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum View {
    /// Address only.
    Adr,
    /// File and line.
    Loc,
    /// File, line and column offset.
    Pos,
    /// The full tuple.
    All,
}

impl View {
    /// Views in comparison order.
    pub const ALL: [Self; 4] = [Self::Loc, Self::Adr, Self::Pos, Self::All];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Adr => "adr",
            Self::Loc => "loc",
            Self::Pos => "pos",
            Self::All => "all",
        }
    }

    /// Depth of this view in the `file → line → offset → address` nesting.
    /// `adr` is a leaf-level view with no prefix.
    pub const fn depth(self) -> Option<usize> {
        match self {
            Self::Adr => None,
            Self::Loc => Some(2),
            Self::Pos => Some(3),
            Self::All => Some(4),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adr" => Ok(Self::Adr),
            "loc" => Ok(Self::Loc),
            "pos" => Ok(Self::Pos),
            "all" => Ok(Self::All),
            _ => Err(ModelError::InvalidView(s.to_string())),
        }
    }
}

/// A [`Location`] projected onto a [`View`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PointKey {
    Adr(Address),
    Loc {
        file: Option<String>,
        line: Option<u32>,
    },
    Pos {
        file: Option<String>,
        line: Option<u32>,
        offset: Option<u32>,
    },
    All(Location),
}

impl PointKey {
    pub fn file(&self) -> Option<&str> {
        match self {
            Self::Adr(_) => None,
            Self::Loc { file, .. } | Self::Pos { file, .. } => file.as_deref(),
            Self::All(loc) => loc.file.as_deref(),
        }
    }

    pub const fn line(&self) -> Option<u32> {
        match self {
            Self::Adr(_) => None,
            Self::Loc { line, .. } | Self::Pos { line, .. } => *line,
            Self::All(loc) => loc.line,
        }
    }

    pub const fn view(&self) -> View {
        match self {
            Self::Adr(_) => View::Adr,
            Self::Loc { .. } => View::Loc,
            Self::Pos { .. } => View::Pos,
            Self::All(_) => View::All,
        }
    }
}

impl fmt::Display for PointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adr(addr) => fmt::Display::fmt(addr, f),
            Self::Loc { file, line } => {
                write!(f, "({}, {})", OptField(file.as_deref()), OptField(*line))
            }
            Self::Pos { file, line, offset } => write!(
                f,
                "({}, {}, {})",
                OptField(file.as_deref()),
                OptField(*line),
                OptField(*offset)
            ),
            Self::All(loc) => fmt::Display::fmt(loc, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, offset: Option<u32>, addr: u64) -> Location {
        Location::new(Some("a.c".into()), Some(line), offset, Address(addr))
    }

    #[test]
    fn test_projection_collapses_fields() {
        let a = loc(5, Some(3), 0x10);
        let b = loc(5, Some(7), 0x14);
        assert_eq!(a.project(View::Loc), b.project(View::Loc));
        assert_ne!(a.project(View::Pos), b.project(View::Pos));
        assert_ne!(a.project(View::Adr), b.project(View::Adr));
        assert_eq!(a.project(View::All), PointKey::All(a.clone()));
    }

    #[test]
    fn test_display() {
        assert_eq!(loc(5, None, 0x10).to_string(), "(a.c, 5, None, 0x10)");
        assert_eq!(loc(5, Some(2), 0x10).project(View::Loc).to_string(), "(a.c, 5)");
        assert_eq!(loc(5, Some(2), 0x10).project(View::Adr).to_string(), "0x10");
    }

    #[test]
    fn test_view_parse() {
        assert_eq!("LOC".parse::<View>().unwrap(), View::Loc);
        assert!("line".parse::<View>().is_err());
        for view in View::ALL {
            assert_eq!(view.as_str().parse::<View>().unwrap(), view);
        }
    }
}
